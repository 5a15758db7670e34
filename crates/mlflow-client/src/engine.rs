//! Run engine delegation
//!
//! A [`RunEngine`] executes one MLproject entrypoint to completion and
//! reports the ID of the tracking run it created. The production engine,
//! [`MlflowCliEngine`], shells out to `mlflow run` and blocks until the child
//! process exits. There is no timeout: a project run takes as long as it takes.

use crate::error::EngineError;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Everything the engine needs to launch a project run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Directory holding the MLproject file.
    pub workdir: PathBuf,
    /// Entrypoint to execute.
    pub entrypoint: String,
    /// Experiment name. Empty selects the engine's default experiment.
    pub experiment: String,
    /// Reconciled entrypoint parameters.
    pub parameters: BTreeMap<String, String>,
}

/// Handle to a run the engine has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedRun {
    pub run_id: String,
}

/// Executes MLproject entrypoints.
#[async_trait]
pub trait RunEngine: Send + Sync {
    /// Run the entrypoint described by `spec` and wait for it to finish.
    async fn run(&self, spec: &RunSpec) -> Result<SubmittedRun, EngineError>;
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `mlflow` executable name or path
    pub executable: String,
    /// Value for `--env-manager`; `local` runs in the current environment
    pub env_manager: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            executable: "mlflow".to_string(),
            env_manager: "local".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create config for a specific executable
    pub fn new(executable: &str) -> Self {
        EngineConfig {
            executable: executable.to_string(),
            ..Default::default()
        }
    }

    /// Set the environment manager
    pub fn with_env_manager(mut self, env_manager: &str) -> Self {
        self.env_manager = env_manager.to_string();
        self
    }
}

/// Runs projects through the `mlflow run` command line.
///
/// The child's stdout is passed straight through. Its stderr is relayed line
/// by line and scanned for the `=== Run (ID '...') ... ===` banner mlflow
/// prints when a run ends, which is the only place the CLI reports the run ID.
pub struct MlflowCliEngine {
    config: EngineConfig,
}

impl MlflowCliEngine {
    pub fn new(config: EngineConfig) -> Self {
        MlflowCliEngine { config }
    }

    /// Arguments passed to the executable for `spec`.
    pub fn command_args(&self, spec: &RunSpec) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "run".into(),
            spec.workdir.clone().into_os_string(),
            "-e".into(),
            spec.entrypoint.clone().into(),
            "--env-manager".into(),
            self.config.env_manager.clone().into(),
        ];
        if !spec.experiment.is_empty() {
            args.push("--experiment-name".into());
            args.push(spec.experiment.clone().into());
        }
        for (name, value) in &spec.parameters {
            args.push("-P".into());
            args.push(format!("{name}={value}").into());
        }
        args
    }
}

#[async_trait]
impl RunEngine for MlflowCliEngine {
    async fn run(&self, spec: &RunSpec) -> Result<SubmittedRun, EngineError> {
        let args = self.command_args(spec);
        debug!(program = %self.config.executable, ?args, "spawning mlflow run");

        let mut child = Command::new(&self.config.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.config.executable.clone(),
                source,
            })?;

        let mut run_id = None;
        if let Some(stderr) = child.stderr.take() {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                eprintln!("{line}");
                if let Some(id) = parse_run_banner(line) {
                    run_id = Some(id);
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(EngineError::RunFailed {
                exit_code: status.code(),
                run_id,
            });
        }

        let run_id = run_id.ok_or(EngineError::MissingRunId)?;
        info!(run_id = %run_id, "mlflow run finished");
        Ok(SubmittedRun { run_id })
    }
}

/// Extract the run ID from mlflow's end-of-run banner, if `line` is one.
pub fn parse_run_banner(line: &str) -> Option<String> {
    static BANNER: OnceLock<Regex> = OnceLock::new();
    let re = BANNER.get_or_init(|| {
        Regex::new(r"=== Run \(ID '([^']+)'\) (?:succeeded|failed|killed)").expect("valid regex")
    });
    re.captures(line).map(|c| c[1].to_string())
}
