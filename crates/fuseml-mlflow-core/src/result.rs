//! Result path construction and persistence.

use crate::project::absolute_path;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure writing the result file.
///
/// Only [`SaveError::Os`] is fatal to the step: the run itself already
/// succeeded, and anything that is not an OS-reported I/O error is logged
/// and otherwise ignored.
#[derive(Error, Debug)]
pub enum SaveError {
    /// The operating system rejected the write (permissions, missing directory, disk full, ...)
    #[error("I/O error while saving result to output file '{}': {source}", path.display())]
    Os {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other failure
    #[error("Unexpected error while saving result to output file '{}': {source}", path.display())]
    Unexpected {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SaveError {
    fn classify(path: &Path, source: std::io::Error) -> Self {
        let path = absolute_path(path);
        if source.raw_os_error().is_some() {
            SaveError::Os { path, source }
        } else {
            SaveError::Unexpected { path, source }
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SaveError::Os { .. })
    }
}

/// Join `subpath` onto an artifact root the way a POSIX path join does.
///
/// The root is usually a URI (`s3://bucket/0/<run>/artifacts`), so this is
/// plain string joining: an absolute subpath replaces the root, and a
/// separator is only added when the root does not already end in one.
pub fn join_artifact_path(root: &str, subpath: &str) -> String {
    if subpath.starts_with('/') || root.is_empty() {
        return subpath.to_string();
    }
    if root.ends_with('/') {
        format!("{root}{subpath}")
    } else {
        format!("{root}/{subpath}")
    }
}

/// Write `content` to `path`, truncating any existing file. No newline is appended.
pub fn save_result(path: &Path, content: &str) -> Result<(), SaveError> {
    let mut file = File::create(path).map_err(|e| SaveError::classify(path, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| SaveError::classify(path, e))?;
    Ok(())
}
