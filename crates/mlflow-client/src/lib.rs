//! mlflow-client: MLflow Integration for FuseML Workflow Steps
//!
//! This crate is the boundary between the FuseML project runner and MLflow.
//! It launches MLproject entrypoints through the `mlflow run` command line
//! and reads finished-run metadata back from the tracking store.
//!
//! Both collaborators sit behind traits ([`RunEngine`], [`TrackingClient`])
//! so the orchestration logic can be tested with the in-memory [`fakes`].

pub mod engine;
pub mod error;
pub mod fakes;
pub mod tracking;

pub use engine::{parse_run_banner, EngineConfig, MlflowCliEngine, RunEngine, RunSpec, SubmittedRun};
pub use error::{EngineError, TrackingError};
pub use tracking::{
    CliTrackingClient, FileStoreTrackingClient, LazyTrackingClient, RestTrackingClient, RunInfo,
    TrackingClient, TrackingConfig, DEFAULT_TRACKING_URI,
};

/// Result type for tracking store operations
pub type Result<T> = std::result::Result<T, TrackingError>;
