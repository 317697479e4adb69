//! Per-file lines and the end-of-run summary
//!
//! In human mode every outcome gets one line as soon as it is known: uploads,
//! planned and unchanged files on stdout, failures on stderr. In JSON mode
//! nothing is printed per file and the whole report is written to stdout as a
//! single document once the run ends.

use console::style;
use s3push_core::{MirrorReport, Outcome, OutcomeStatus};

use super::OutputConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Success,
    Warning,
}

/// Writes outcome lines, summaries and setup errors
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    fn mark(&self, symbol: &'static str, level: Option<Level>) -> String {
        if !self.colors_enabled() {
            return symbol.to_string();
        }
        match level {
            Some(Level::Success) => style(symbol).green().to_string(),
            Some(Level::Warning) => style(symbol).yellow().to_string(),
            None => style(symbol).red().to_string(),
        }
    }

    /// Print the line for one outcome
    ///
    /// Failures are printed even in quiet mode.
    pub fn outcome(&self, bucket: &str, outcome: &Outcome) {
        if self.config.json {
            return;
        }
        let line = describe(bucket, outcome);
        if outcome.is_failure() {
            eprintln!("{} {line}", self.mark("✗", None));
        } else if !self.config.quiet {
            println!("{line}");
        }
    }

    /// Print the end-of-run summary, or the whole report in JSON mode
    pub fn report(&self, report: &MirrorReport) {
        if self.config.json {
            match serde_json::to_string_pretty(report) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error serializing report: {e}"),
            }
            return;
        }
        if self.config.quiet {
            return;
        }

        match summary(report) {
            (Level::Success, message) => println!("{} {message}", self.mark("✓", Some(Level::Success))),
            (Level::Warning, message) => eprintln!("{} {message}", self.mark("⚠", Some(Level::Warning))),
        }
    }

    /// Report an error that stopped the run before any file was processed
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({ "error": message });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
            );
        } else {
            eprintln!("{} {message}", self.mark("✗", None));
        }
    }
}

/// One human-readable line for an outcome
fn describe(bucket: &str, outcome: &Outcome) -> String {
    let local = outcome.local_path.display();
    let target = match &outcome.key {
        Some(key) => format!("s3://{bucket}/{key}"),
        None => format!("s3://{bucket}"),
    };

    match &outcome.status {
        OutcomeStatus::Uploaded { size_bytes, .. } => format!(
            "{local} -> {target} ({})",
            humansize::format_size(*size_bytes, humansize::BINARY)
        ),
        OutcomeStatus::Unchanged => format!("{local} = {target} (unchanged)"),
        OutcomeStatus::Planned => format!("Would upload: {local} -> {target}"),
        OutcomeStatus::Failed { kind, message } => match &outcome.key {
            Some(_) => format!("Error uploading '{local}' to {target}: {kind}: {message}"),
            None => format!("{kind}: {message}"),
        },
    }
}

fn summary(report: &MirrorReport) -> (Level, String) {
    let uploaded = report.uploaded();

    if report.fatal_outcome().is_some() {
        let message = format!("Stopped early: {uploaded} uploaded, {} failed", report.failed());
        (Level::Warning, message)
    } else if !report.is_success() {
        let message = format!(
            "Completed with errors: {uploaded} succeeded, {} failed",
            report.failed()
        );
        (Level::Warning, message)
    } else if report.planned() > 0 {
        (Level::Success, format!("Would upload {} file(s).", report.planned()))
    } else if report.outcomes.is_empty() {
        (Level::Warning, "No files found to upload.".to_string())
    } else {
        let size = humansize::format_size(report.bytes_uploaded(), humansize::BINARY);
        let mut message = format!("Uploaded {uploaded} file(s) ({size}).");
        if report.unchanged() > 0 {
            message.push_str(&format!(" {} unchanged.", report.unchanged()));
        }
        (Level::Success, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3push_core::FailureKind;

    #[test]
    fn test_formatter_modes() {
        let formatter = Formatter::new(OutputConfig::default());
        assert!(!formatter.is_json());
        assert!(formatter.colors_enabled());

        let json = Formatter::new(OutputConfig {
            json: true,
            ..Default::default()
        });
        assert!(json.is_json());
        assert!(!json.colors_enabled());

        let plain = Formatter::new(OutputConfig {
            no_color: true,
            ..Default::default()
        });
        assert_eq!(plain.mark("✓", Some(Level::Success)), "✓");
    }

    #[test]
    fn test_describe_outcomes() {
        let uploaded = Outcome::uploaded("./models/config.json", "llama318b/config.json", 2048, None);
        assert_eq!(
            describe("models", &uploaded),
            "./models/config.json -> s3://models/llama318b/config.json (2 KiB)"
        );

        let planned = Outcome::planned("./models/a.bin", "a.bin");
        assert_eq!(
            describe("models", &planned),
            "Would upload: ./models/a.bin -> s3://models/a.bin"
        );

        let unchanged = Outcome::unchanged("./models/a.bin", "a.bin");
        assert_eq!(
            describe("models", &unchanged),
            "./models/a.bin = s3://models/a.bin (unchanged)"
        );

        let failed = Outcome::failed(
            "./models/a.bin",
            Some("a.bin".into()),
            FailureKind::RemoteRejected,
            "AccessDenied: Access Denied",
        );
        assert_eq!(
            describe("models", &failed),
            "Error uploading './models/a.bin' to s3://models/a.bin: remote rejected: AccessDenied: Access Denied"
        );

        let fatal = Outcome::failed(
            "./models",
            None,
            FailureKind::LocalPathNotFound,
            "Local folder './models' not found",
        );
        assert_eq!(
            describe("models", &fatal),
            "local path not found: Local folder './models' not found"
        );
    }

    #[test]
    fn test_summary() {
        let mut report = MirrorReport::new("models", "");
        assert_eq!(
            summary(&report),
            (Level::Warning, "No files found to upload.".to_string())
        );

        report.outcomes.push(Outcome::uploaded("a", "a", 1024, None));
        report.outcomes.push(Outcome::unchanged("b", "b"));
        assert_eq!(
            summary(&report),
            (Level::Success, "Uploaded 1 file(s) (1 KiB). 1 unchanged.".to_string())
        );

        report.outcomes.push(Outcome::failed(
            "c",
            Some("c".into()),
            FailureKind::LocalFileVanished,
            "gone",
        ));
        assert_eq!(
            summary(&report),
            (Level::Warning, "Completed with errors: 1 succeeded, 1 failed".to_string())
        );

        let fatal = MirrorReport::fatal("models", "", ".", FailureKind::CredentialsMissing, "none");
        assert_eq!(summary(&fatal).1, "Stopped early: 0 uploaded, 1 failed");
    }
}
