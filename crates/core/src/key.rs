//! Object key derivation
//!
//! Maps a local file below the mirrored root to its object key. Keys always
//! use forward slashes, whatever the host path convention, and depend only on
//! the file's own relative path.

use std::path::{Component, Path};

use crate::error::{Error, Result};

/// Normalize a key prefix
///
/// Backslashes become forward slashes, empty segments are dropped and
/// leading/trailing slashes are trimmed, so `"models/"`, `"/models"` and
/// `"models"` all normalize to `"models"`.
pub fn normalize_prefix(prefix: &str) -> String {
    prefix
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a prefix and a relative key with a single `/`
pub fn object_key(prefix: &str, relative: &str) -> String {
    let prefix = normalize_prefix(prefix);
    let relative = relative.replace('\\', "/");
    let relative = relative.trim_start_matches('/');

    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

/// Relative path of `file` under `root`, joined with forward slashes
pub fn relative_key(file: &Path, root: &Path) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| {
        Error::InvalidPath(format!(
            "'{}' is not inside '{}'",
            file.display(),
            root.display()
        ))
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    Error::InvalidPath(format!("'{}' is not valid UTF-8", file.display()))
                })?;
                parts.push(part.replace('\\', "/"));
            }
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath(format!(
                    "'{}' escapes '{}'",
                    file.display(),
                    root.display()
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(Error::InvalidPath(format!(
            "'{}' is the mirrored root itself",
            file.display()
        )));
    }

    Ok(parts.join("/"))
}

/// Object key for `file` mirrored from `root` under `prefix`
pub fn key_for(file: &Path, root: &Path, prefix: &str) -> Result<String> {
    Ok(object_key(prefix, &relative_key(file, root)?))
}
