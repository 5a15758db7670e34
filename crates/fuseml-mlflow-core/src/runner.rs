//! Project run orchestration
//!
//! [`run_project`] walks a fixed sequence: load the descriptor, reconcile
//! parameters, hand the entrypoint to the engine, re-read the finished run
//! from the tracking store, then report the result path. Any failure before
//! the result is written ends the sequence; nothing is retried.

use crate::error::RunnerError;
use crate::obs;
use crate::params::{self, EntrypointArg, ParameterSet, WorkflowInputs};
use crate::project::ProjectDescriptor;
use crate::result::{join_artifact_path, save_result, SaveError};
use crate::Result;
use mlflow_client::{RunEngine, RunSpec, TrackingClient};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Options for one project run.
#[derive(Debug, Clone)]
pub struct ProjectRun {
    /// Directory containing the MLproject file.
    pub workdir: PathBuf,
    pub entrypoint: String,
    pub entrypoint_args: Vec<EntrypointArg>,
    /// Experiment name; empty selects the default experiment.
    pub experiment: String,
    /// Path under the run's artifact root reported as the result.
    pub artifact_subpath: String,
    /// Where to write the result path; printed only when unset.
    pub save_result_to_file: Option<PathBuf>,
}

impl Default for ProjectRun {
    fn default() -> Self {
        ProjectRun {
            workdir: PathBuf::from("."),
            entrypoint: "main".to_string(),
            entrypoint_args: Vec::new(),
            experiment: String::new(),
            artifact_subpath: "model".to_string(),
            save_result_to_file: None,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub parameters: ParameterSet,
    /// Artifact root joined with the requested subpath.
    pub result_path: String,
    /// Whether the result path was written to `save_result_to_file`.
    pub saved: bool,
}

/// Run one MLproject entrypoint and report where its artifact ended up.
pub async fn run_project(
    request: &ProjectRun,
    inputs: &WorkflowInputs,
    engine: &dyn RunEngine,
    tracking: &dyn TrackingClient,
) -> Result<RunOutcome> {
    let span = obs::project_span(&request.workdir, &request.entrypoint);
    execute(request, inputs, engine, tracking)
        .instrument(span)
        .await
}

async fn execute(
    request: &ProjectRun,
    inputs: &WorkflowInputs,
    engine: &dyn RunEngine,
    tracking: &dyn TrackingClient,
) -> Result<RunOutcome> {
    let project = ProjectDescriptor::load(&request.workdir)?;
    obs::emit_project_loaded(project.name.as_deref(), project.entry_point_names().count());
    let entrypoint = project.entry_point(&request.entrypoint)?;

    let parameters = params::reconcile(
        &request.entrypoint,
        entrypoint,
        &request.entrypoint_args,
        inputs,
    )?;
    obs::emit_params_reconciled(&parameters);

    info!("Launching '{}' MLFlow entrypoint...", request.entrypoint);
    obs::emit_run_launched(&request.entrypoint, &request.experiment);
    let spec = RunSpec {
        workdir: request.workdir.clone(),
        entrypoint: request.entrypoint.clone(),
        experiment: request.experiment.clone(),
        parameters: parameters.clone(),
    };
    let start = Instant::now();
    let submitted = engine.run(&spec).await.map_err(|source| {
        error!("MLFlow run for entrypoint '{}' failed", request.entrypoint);
        RunnerError::RunFailed {
            entrypoint: request.entrypoint.clone(),
            source,
        }
    })?;
    obs::emit_run_finished(&submitted.run_id, start.elapsed().as_millis() as u64);

    // The engine's handle does not carry the final artifact location.
    let run = tracking
        .get_run(&submitted.run_id)
        .await
        .map_err(|source| RunnerError::Tracking {
            run_id: submitted.run_id.clone(),
            source,
        })?;
    let result_path = join_artifact_path(&run.artifact_uri, &request.artifact_subpath);
    debug!(result_path = %result_path, "resolved result artifact path");

    let mut saved = false;
    if let Some(out) = &request.save_result_to_file {
        match save_result(out, &result_path) {
            Ok(()) => {
                obs::emit_result_saved(out);
                saved = true;
            }
            Err(SaveError::Os { path, source }) => {
                return Err(RunnerError::OutputIo { path, source });
            }
            Err(e) => warn!("{e}"),
        }
    }

    Ok(RunOutcome {
        run_id: submitted.run_id,
        parameters,
        result_path,
        saved,
    })
}
