//! FuseML MLflow Core - workflow step logic for MLflow projects
//!
//! A FuseML workflow step that wraps an MLflow project needs to turn workflow
//! inputs into entrypoint parameters, run the entrypoint, and hand the
//! resulting model location to the next step. This crate holds that logic:
//!
//! - [`project`]: the MLproject descriptor and its entrypoints
//! - [`params`]: `name=value` argument parsing and parameter reconciliation
//! - [`result`]: artifact path joining and result file output
//! - [`runner`]: the end-to-end [`run_project`] procedure
//!
//! Running the project and reading run metadata is delegated to the
//! `mlflow-client` crate.

pub mod error;
pub mod obs;
pub mod params;
pub mod project;
pub mod result;
pub mod runner;
pub mod telemetry;

pub use error::{Result, RunnerError};
pub use params::{reconcile, EntrypointArg, ParameterSet, WorkflowInputs, WORKFLOW_INPUT_PREFIX};
pub use project::{EntryPoint, Parameter, ProjectDescriptor, DESCRIPTOR_FILE};
pub use result::{join_artifact_path, save_result, SaveError};
pub use runner::{run_project, ProjectRun, RunOutcome};
pub use telemetry::init_tracing;
