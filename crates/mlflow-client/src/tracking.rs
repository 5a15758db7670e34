//! Tracking store clients
//!
//! After a run completes its metadata is re-read from the tracking store,
//! because only the store knows the final artifact location. An MLflow
//! tracking server is read over its REST API and the local `mlruns` file
//! store is read directly. Every other store (SQL databases, Databricks, ...)
//! is read through `mlflow runs describe`, so whatever `mlflow run` can
//! write to, the runner can read back.

use crate::error::TrackingError;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Tracking URI used by mlflow when `MLFLOW_TRACKING_URI` is unset.
pub const DEFAULT_TRACKING_URI: &str = "./mlruns";

/// Run metadata needed to locate its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    #[serde(default)]
    pub experiment_id: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Root URI under which the run's artifacts are stored.
    pub artifact_uri: String,
}

/// Reads run metadata from a tracking store.
#[async_trait]
pub trait TrackingClient: Send + Sync {
    /// Fetch metadata for `run_id`. Returns `TrackingError::RunNotFound` if absent.
    async fn get_run(&self, run_id: &str) -> Result<RunInfo>;
}

/// Tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Tracking URI (`http(s)://...`, `file:...` or a plain directory)
    pub tracking_uri: String,
    /// Bearer token for the tracking server
    pub token: Option<String>,
    /// Basic auth username
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// `mlflow` executable used for stores without a native client
    pub executable: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            tracking_uri: std::env::var("MLFLOW_TRACKING_URI")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_TRACKING_URI.to_string()),
            token: std::env::var("MLFLOW_TRACKING_TOKEN").ok(),
            username: std::env::var("MLFLOW_TRACKING_USERNAME").ok(),
            password: std::env::var("MLFLOW_TRACKING_PASSWORD").ok(),
            executable: "mlflow".to_string(),
        }
    }
}

impl TrackingConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific tracking URI
    pub fn new(tracking_uri: &str) -> Self {
        TrackingConfig {
            tracking_uri: tracking_uri.to_string(),
            token: None,
            username: None,
            password: None,
            executable: "mlflow".to_string(),
        }
    }

    /// Set bearer token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Set the `mlflow` executable used for stores without a native client
    pub fn with_executable(mut self, executable: &str) -> Self {
        self.executable = executable.to_string();
        self
    }

    /// Build the client matching the tracking URI scheme.
    pub fn connect(&self) -> Result<Box<dyn TrackingClient>> {
        let uri = self.tracking_uri.as_str();
        if uri.starts_with("http://") || uri.starts_with("https://") {
            info!(tracking_uri = %uri, "using REST tracking store");
            return Ok(Box::new(RestTrackingClient::new(self.clone())?));
        }
        if let Some(root) = file_store_root(uri) {
            info!(root = ?root, "using file tracking store");
            return Ok(Box::new(FileStoreTrackingClient::new(root)));
        }
        info!(tracking_uri = %uri, "reading run metadata through the mlflow CLI");
        Ok(Box::new(CliTrackingClient::new(self.clone())))
    }
}

/// Local directory behind a `file:` URI or a bare path; `None` for other schemes.
fn file_store_root(uri: &str) -> Option<PathBuf> {
    if uri == "databricks" || uri.starts_with("databricks:") {
        return None;
    }
    if let Some(rest) = uri.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    if let Some(rest) = uri.strip_prefix("file:") {
        return Some(PathBuf::from(rest));
    }
    match uri.split_once("://") {
        Some(_) => None,
        None => Some(PathBuf::from(uri)),
    }
}

// ---------------------------------------------------------------------------
// LazyTrackingClient
// ---------------------------------------------------------------------------

/// Connects to the configured store on the first lookup.
///
/// A run is only read back once the engine has finished, so nothing about
/// the tracking store is checked before the project itself is validated
/// and launched.
pub struct LazyTrackingClient {
    config: TrackingConfig,
    client: OnceCell<Box<dyn TrackingClient>>,
}

impl LazyTrackingClient {
    pub fn new(config: TrackingConfig) -> Self {
        LazyTrackingClient {
            config,
            client: OnceCell::new(),
        }
    }
}

#[async_trait]
impl TrackingClient for LazyTrackingClient {
    async fn get_run(&self, run_id: &str) -> Result<RunInfo> {
        let client = self
            .client
            .get_or_try_init(|| async { self.config.connect() })
            .await?;
        client.get_run(run_id).await
    }
}

// ---------------------------------------------------------------------------
// CliTrackingClient
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DescribedRun {
    info: RestRunInfo,
}

/// Reads run metadata with `mlflow runs describe --run-id <id>`.
pub struct CliTrackingClient {
    config: TrackingConfig,
}

impl CliTrackingClient {
    pub fn new(config: TrackingConfig) -> Self {
        CliTrackingClient { config }
    }
}

#[async_trait]
impl TrackingClient for CliTrackingClient {
    async fn get_run(&self, run_id: &str) -> Result<RunInfo> {
        debug!(program = %self.config.executable, run_id, "describing run");
        let output = Command::new(&self.config.executable)
            .args(["runs", "describe", "--run-id", run_id])
            .env("MLFLOW_TRACKING_URI", &self.config.tracking_uri)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| TrackingError::Spawn {
                program: self.config.executable.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TrackingError::CommandFailed(stderr));
        }

        // The JSON document is the last thing printed; skip anything before it.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout: &str = &stdout;
        let json = stdout.find('{').map_or(stdout, |i| &stdout[i..]);
        let described: DescribedRun = serde_json::from_str(json)?;
        Ok(described.info.into_run_info(run_id))
    }
}

// ---------------------------------------------------------------------------
// RestTrackingClient
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GetRunResponse {
    run: RestRun,
}

#[derive(Deserialize)]
struct RestRun {
    info: RestRunInfo,
}

#[derive(Deserialize)]
struct RestRunInfo {
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    run_uuid: Option<String>,
    #[serde(default)]
    experiment_id: String,
    #[serde(default)]
    status: Option<String>,
    artifact_uri: String,
}

impl RestRunInfo {
    fn into_run_info(self, requested_id: &str) -> RunInfo {
        RunInfo {
            run_id: self
                .run_id
                .or(self.run_uuid)
                .unwrap_or_else(|| requested_id.to_string()),
            experiment_id: self.experiment_id,
            status: self.status,
            artifact_uri: self.artifact_uri,
        }
    }
}

/// Client for the MLflow tracking server REST API.
pub struct RestTrackingClient {
    config: TrackingConfig,
    http_client: reqwest::Client,
}

impl RestTrackingClient {
    pub fn new(config: TrackingConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("fuseml-mlflow/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(RestTrackingClient {
            config,
            http_client,
        })
    }

    fn runs_get_url(&self) -> String {
        format!(
            "{}/api/2.0/mlflow/runs/get",
            self.config.tracking_uri.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TrackingClient for RestTrackingClient {
    async fn get_run(&self, run_id: &str) -> Result<RunInfo> {
        let url = self.runs_get_url();
        debug!(%url, run_id, "fetching run metadata");

        let mut request = self.http_client.get(&url).query(&[("run_id", run_id)]);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        } else if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TrackingError::RunNotFound(run_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: GetRunResponse = serde_json::from_str(&body)?;
        Ok(parsed.run.info.into_run_info(run_id))
    }
}

// ---------------------------------------------------------------------------
// FileStoreTrackingClient
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct MetaYaml {
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    run_uuid: Option<String>,
    #[serde(default)]
    experiment_id: Option<serde_yaml::Value>,
    #[serde(default)]
    status: Option<serde_yaml::Value>,
    artifact_uri: String,
}

/// Reads run metadata straight out of an `mlruns` directory.
///
/// Layout: `<root>/<experiment id>/<run id>/meta.yaml`.
pub struct FileStoreTrackingClient {
    root: PathBuf,
}

impl FileStoreTrackingClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStoreTrackingClient { root: root.into() }
    }

    fn find_meta(&self, run_id: &str) -> Result<Option<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(None);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let experiment_dir = entry?.path();
            if !experiment_dir.is_dir() {
                continue;
            }
            let meta = experiment_dir.join(run_id).join("meta.yaml");
            if meta.is_file() {
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }
}

fn yaml_scalar(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn read_meta(path: &Path) -> Result<MetaYaml> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| TrackingError::InvalidMetadata {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl TrackingClient for FileStoreTrackingClient {
    async fn get_run(&self, run_id: &str) -> Result<RunInfo> {
        let meta_path = self
            .find_meta(run_id)?
            .ok_or_else(|| TrackingError::RunNotFound(run_id.to_string()))?;
        debug!(path = ?meta_path, "reading run metadata");

        let meta = read_meta(&meta_path)?;
        Ok(RunInfo {
            run_id: meta
                .run_id
                .or(meta.run_uuid)
                .unwrap_or_else(|| run_id.to_string()),
            experiment_id: meta.experiment_id.and_then(yaml_scalar).unwrap_or_default(),
            status: meta.status.and_then(yaml_scalar),
            artifact_uri: meta.artifact_uri,
        })
    }
}
