//! FuseML MLflow step - run an MLproject entrypoint from a workflow
//!
//! The `mlflow-run` command maps FuseML workflow input parameters to the
//! arguments of an MLproject entrypoint, runs it with `mlflow run`, and
//! saves the URL of the resulting artifact for the next workflow step.
//!
//! Workflow inputs arrive as `FUSEML_<NAME>` environment variables and fill
//! every entrypoint parameter not given explicitly via `--entrypoint_args`.

use anyhow::Result;
use clap::Parser;
use fuseml_mlflow_core::{
    init_tracing, run_project, EntrypointArg, ProjectRun, RunOutcome, RunnerError, WorkflowInputs,
};
use mlflow_client::{
    EngineConfig, LazyTrackingClient, MlflowCliEngine, RunEngine, TrackingClient, TrackingConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};

#[derive(Parser, Debug)]
#[command(name = "mlflow-run")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "FuseML workflow step wrapper for MLFlow projects",
    long_about = "FuseML workflow step wrapper for MLFlow projects. Maps workflow input \
                  parameters to the corresponding entrypoint arguments configured in the MLproject."
)]
struct Cli {
    /// MLFlow work directory where MLproject is located
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// MLproject entrypoint to execute
    #[arg(long, default_value = "main")]
    entrypoint: String,

    /// Additional MLproject run entrypoint arguments in the form <name>=<value>
    #[arg(
        long = "entrypoint_args",
        visible_alias = "entrypoint-args",
        num_args = 0..,
        value_parser = parse_entrypoint_arg
    )]
    entrypoint_args: Vec<EntrypointArg>,

    /// MLFlow experiment name to use for project run
    #[arg(long, default_value = "")]
    experiment: String,

    /// File or folder under the MLFlow run artifacts location to return as workflow result
    #[arg(long = "artifact_subpath", visible_alias = "artifact-subpath", default_value = "model")]
    artifact_subpath: String,

    /// File where to save the URL of the resulting MLFlow artifact.
    /// If not set, the URL is only printed.
    #[arg(long = "save_result_to_file", visible_alias = "save-result-to-file")]
    save_result_to_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// mlflow executable used to run the project
    #[arg(long = "mlflow-bin", env = "MLFLOW_BIN", default_value = "mlflow")]
    mlflow_bin: String,

    /// Environment manager passed to `mlflow run --env-manager`
    #[arg(long = "env-manager", env = "MLFLOW_ENV_MANAGER", default_value = "local")]
    env_manager: String,
}

impl Cli {
    fn project_run(&self) -> ProjectRun {
        ProjectRun {
            workdir: self.workdir.clone(),
            entrypoint: self.entrypoint.clone(),
            entrypoint_args: self.entrypoint_args.clone(),
            experiment: self.experiment.clone(),
            artifact_subpath: self.artifact_subpath.clone(),
            save_result_to_file: self.save_result_to_file.clone(),
        }
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.mlflow_bin).with_env_manager(&self.env_manager)
    }
}

fn parse_entrypoint_arg(value: &str) -> std::result::Result<EntrypointArg, String> {
    EntrypointArg::parse(value).map_err(|e| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cmd_run(&cli).await {
        Ok(outcome) => {
            println!("{}", result_line(&outcome));
            debug!(run_id = %outcome.run_id, saved = outcome.saved, "step complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            // Runner errors already carry their cause in the message.
            if err.downcast_ref::<RunnerError>().is_some() {
                println!("{err}");
            } else {
                println!("{err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Wire up the real engine and tracking store, then run the project.
///
/// The tracking store is only contacted once the run has finished, so
/// descriptor and argument problems are reported first.
async fn cmd_run(cli: &Cli) -> Result<RunOutcome> {
    let engine = MlflowCliEngine::new(cli.engine_config());
    let tracking = LazyTrackingClient::new(tracking_config(cli));

    run_with(cli, &WorkflowInputs::from_env(), &engine, &tracking).await
}

fn tracking_config(cli: &Cli) -> TrackingConfig {
    TrackingConfig::from_env().with_executable(&cli.mlflow_bin)
}

fn result_line(outcome: &RunOutcome) -> String {
    format!("Result artifact path: {}", outcome.result_path)
}

async fn run_with(
    cli: &Cli,
    inputs: &WorkflowInputs,
    engine: &dyn RunEngine,
    tracking: &dyn TrackingClient,
) -> Result<RunOutcome> {
    let outcome = run_project(&cli.project_run(), inputs, engine, tracking).await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlflow_client::fakes::{FakeRunEngine, MemoryTrackingClient};

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["mlflow-run"]).unwrap();
        assert_eq!(cli.workdir, PathBuf::from("."));
        assert_eq!(cli.entrypoint, "main");
        assert!(cli.entrypoint_args.is_empty());
        assert_eq!(cli.experiment, "");
        assert_eq!(cli.artifact_subpath, "model");
        assert!(cli.save_result_to_file.is_none());
        assert_eq!(cli.env_manager, "local");
    }

    #[test]
    fn test_entrypoint_args_multiple_values() {
        let cli = Cli::try_parse_from([
            "mlflow-run",
            "--entrypoint_args",
            "alpha=0.5",
            "query=a=b",
            "empty=",
            "--experiment",
            "wine",
        ])
        .unwrap();

        let parsed: Vec<(&str, &str)> = cli
            .entrypoint_args
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(parsed, vec![("alpha", "0.5"), ("query", "a=b"), ("empty", "")]);
        assert_eq!(cli.experiment, "wine");
    }

    #[test]
    fn test_malformed_entrypoint_arg_rejected_at_parse_time() {
        let err = Cli::try_parse_from(["mlflow-run", "--entrypoint_args", "alpha=1", "not-an-arg"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(err
            .to_string()
            .contains("Invalid format for --entrypoint_args value: not-an-arg"));
    }

    #[test]
    fn test_kebab_case_aliases() {
        let cli = Cli::try_parse_from([
            "mlflow-run",
            "--artifact-subpath",
            "model/MLmodel",
            "--save-result-to-file",
            "/tmp/out.txt",
        ])
        .unwrap();
        assert_eq!(cli.artifact_subpath, "model/MLmodel");
        assert_eq!(cli.save_result_to_file, Some(PathBuf::from("/tmp/out.txt")));
    }

    #[tokio::test]
    async fn test_run_with_fakes_writes_result() {
        let workdir = tempfile::tempdir().unwrap();
        std::fs::write(
            workdir.path().join("MLproject"),
            "entry_points:\n  main:\n    parameters:\n      alpha: float\n",
        )
        .unwrap();
        let out = workdir.path().join("result.txt");

        let cli = Cli::try_parse_from([
            "mlflow-run".to_string(),
            "--workdir".to_string(),
            workdir.path().display().to_string(),
            "--save_result_to_file".to_string(),
            out.display().to_string(),
        ])
        .unwrap();

        let engine = FakeRunEngine::succeeding("run1");
        let tracking = MemoryTrackingClient::new();
        tracking.insert_run("run1", "s3://bucket/run1");
        let inputs: WorkflowInputs = [("FUSEML_ALPHA", "0.3")].into_iter().collect();

        let outcome = run_with(&cli, &inputs, &engine, &tracking).await.unwrap();
        assert_eq!(outcome.parameters.get("alpha").map(String::as_str), Some("0.3"));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "s3://bucket/run1/model");
    }

    #[tokio::test]
    async fn test_runner_error_survives_anyhow() {
        let workdir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "mlflow-run".to_string(),
            "--workdir".to_string(),
            workdir.path().display().to_string(),
        ])
        .unwrap();

        let err = run_with(
            &cli,
            &WorkflowInputs::default(),
            &FakeRunEngine::new(),
            &MemoryTrackingClient::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RunnerError>(),
            Some(RunnerError::DescriptorNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_descriptor_reported_before_tracking_store() {
        let workdir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "mlflow-run".to_string(),
            "--workdir".to_string(),
            workdir.path().display().to_string(),
        ])
        .unwrap();
        let tracking = LazyTrackingClient::new(TrackingConfig::new("sqlite:///mlflow.db"));
        let engine = FakeRunEngine::new();

        let err = run_with(&cli, &WorkflowInputs::default(), &engine, &tracking)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RunnerError>(),
            Some(RunnerError::DescriptorNotFound(_))
        ));
        let message = err.to_string();
        assert!(message.starts_with("Could not find MLproject file at location"), "{message}");
        assert!(message.contains(&workdir.path().display().to_string()), "{message}");
        assert!(engine.launches().is_empty());
    }

    #[test]
    fn test_tracking_config_uses_mlflow_bin() {
        let cli = Cli::try_parse_from(["mlflow-run", "--mlflow-bin", "/opt/mlflow/bin/mlflow"])
            .unwrap();
        assert_eq!(tracking_config(&cli).executable, "/opt/mlflow/bin/mlflow");
    }

    #[test]
    fn test_result_line() {
        let outcome = RunOutcome {
            run_id: "run1".to_string(),
            parameters: Default::default(),
            result_path: "s3://bucket/run1/model".to_string(),
            saved: false,
        };
        assert_eq!(result_line(&outcome), "Result artifact path: s3://bucket/run1/model");
    }
}
