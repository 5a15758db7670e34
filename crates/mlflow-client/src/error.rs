//! Error types for mlflow-client

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while delegating a project run to the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine executable could not be started
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine exited unsuccessfully
    #[error("mlflow run exited with status {}{}", fmt_exit_code(.exit_code), fmt_run_id(.run_id))]
    RunFailed {
        exit_code: Option<i32>,
        run_id: Option<String>,
    },

    /// The engine succeeded but never reported which run it created
    #[error("mlflow run completed without reporting a run ID")]
    MissingRunId,

    /// Any other I/O failure while supervising the engine process
    #[error("I/O error while supervising mlflow run: {0}")]
    Io(#[from] std::io::Error),

    /// Engine-side rejection (used by fakes and non-process engines)
    #[error("{0}")]
    Rejected(String),
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "<terminated by signal>".to_string(),
    }
}

fn fmt_run_id(run_id: &Option<String>) -> String {
    match run_id {
        Some(id) => format!(" (run ID '{id}')"),
        None => String::new(),
    }
}

/// Errors raised while reading run metadata from the tracking store
#[derive(Error, Debug)]
pub enum TrackingError {
    /// The mlflow executable could not be started
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `mlflow runs describe` exited unsuccessfully
    #[error("mlflow runs describe failed: {0}")]
    CommandFailed(String),

    /// The run does not exist in the tracking store
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// The tracking server answered with a non-success status
    #[error("tracking server returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// A run metadata file could not be parsed
    #[error("invalid run metadata at {path:?}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for TrackingError {
    fn from(err: reqwest::Error) -> Self {
        TrackingError::Http(err.to_string())
    }
}
