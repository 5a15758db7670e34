//! Structured lifecycle events for a project run.
//!
//! Every step of [`crate::run_project`] emits one `info!` event with a stable
//! `event` field so JSON log consumers can follow a run without parsing
//! free-form messages.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Span tagged with the working directory and entrypoint of a run.
pub fn project_span(workdir: &Path, entrypoint: &str) -> tracing::Span {
    tracing::info_span!("mlflow.project", workdir = %workdir.display(), entrypoint = %entrypoint)
}

/// Emit event: descriptor loaded.
pub fn emit_project_loaded(name: Option<&str>, entry_points: usize) {
    info!(event = "project.loaded", project = name.unwrap_or("<unnamed>"), entry_points);
}

/// Emit event: parameter set reconciled.
pub fn emit_params_reconciled(parameters: &BTreeMap<String, String>) {
    let names: Vec<&str> = parameters.keys().map(String::as_str).collect();
    info!(event = "params.reconciled", count = parameters.len(), names = ?names);
}

/// Emit event: entrypoint handed to the engine.
pub fn emit_run_launched(entrypoint: &str, experiment: &str) {
    info!(event = "run.launched", entrypoint = %entrypoint, experiment = %experiment);
}

/// Emit event: engine reported completion.
pub fn emit_run_finished(run_id: &str, duration_ms: u64) {
    info!(event = "run.finished", run_id = %run_id, duration_ms);
}

/// Emit event: result path written to its output file.
pub fn emit_result_saved(path: &Path) {
    info!(event = "result.saved", path = %path.display());
}
