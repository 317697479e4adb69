//! CLI definition and execution
//!
//! s3push has a single operation, mirroring a directory into a bucket, so the
//! CLI is one flat argument set rather than a tree of subcommands.

use clap::Parser;

use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

pub mod push;

/// s3push - mirror a local directory into an S3-compatible bucket
///
/// Every regular file under LOCAL_DIR is uploaded to BUCKET at
/// PREFIX/<relative path>. Works with AWS S3, MinIO, and other S3-compatible
/// services.
#[derive(Parser, Debug)]
#[command(name = "s3push")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub push: push::PushArgs,

    /// Output format: human-readable or JSON
    #[arg(long, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub debug: bool,
}

impl Cli {
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            no_progress: self.no_progress,
            quiet: self.quiet,
        }
    }
}

/// Execute the CLI and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = cli.output_config();
    push::execute(cli.push, output_config).await
}
