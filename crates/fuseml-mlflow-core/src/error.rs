//! Error types for fuseml-mlflow-core

use mlflow_client::{EngineError, TrackingError};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures of a project run. Every variant ends the process with a
/// non-zero status.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// No MLproject file in the working directory
    #[error("Could not find MLproject file at location '{}'", .0.display())]
    DescriptorNotFound(PathBuf),

    /// MLproject file exists but is not a valid descriptor
    #[error("Invalid MLproject file '{}': {reason}", path.display())]
    InvalidDescriptor { path: PathBuf, reason: String },

    /// Requested entrypoint is not declared
    #[error("Entrypoint '{0}' not found in MLproject definition file")]
    EntrypointNotFound(String),

    /// Explicit argument names a parameter the entrypoint does not declare
    #[error("Entrypoint '{entrypoint}' does not have an argument with name '{name}'")]
    UnknownArgument { entrypoint: String, name: String },

    /// Entrypoint argument not in `name=value` form
    #[error("Invalid format for --entrypoint_args value: {0}")]
    InvalidArgumentFormat(String),

    /// The run engine reported a failure
    #[error("MLFlow run for entrypoint '{entrypoint}' failed: {source}")]
    RunFailed {
        entrypoint: String,
        #[source]
        source: EngineError,
    },

    /// Finished run metadata could not be re-fetched
    #[error("Could not fetch metadata for MLFlow run '{run_id}': {source}")]
    Tracking {
        run_id: String,
        #[source]
        source: TrackingError,
    },

    /// OS-level failure writing the result file
    #[error("I/O error while saving result to output file '{}': {source}", path.display())]
    OutputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;
