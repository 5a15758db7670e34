//! In-memory fakes for the engine and tracking seams (testing only)
//!
//! `FakeRunEngine` records every launch and answers with a canned run ID or
//! failure; `MemoryTrackingClient` serves run metadata from a map.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::engine::{RunEngine, RunSpec, SubmittedRun};
use crate::error::{EngineError, TrackingError};
use crate::tracking::{RunInfo, TrackingClient};

// ---------------------------------------------------------------------------
// FakeRunEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Outcome {
    Succeed(Option<String>),
    Fail(String),
}

/// Engine that never launches anything.
#[derive(Debug)]
pub struct FakeRunEngine {
    outcome: Outcome,
    launches: Mutex<Vec<RunSpec>>,
}

impl FakeRunEngine {
    /// Engine whose runs succeed with the given run ID.
    pub fn succeeding(run_id: &str) -> Self {
        Self {
            outcome: Outcome::Succeed(Some(run_id.to_string())),
            launches: Mutex::new(Vec::new()),
        }
    }

    /// Engine whose runs succeed with a freshly generated run ID.
    pub fn new() -> Self {
        Self {
            outcome: Outcome::Succeed(None),
            launches: Mutex::new(Vec::new()),
        }
    }

    /// Engine whose runs always fail with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            outcome: Outcome::Fail(reason.to_string()),
            launches: Mutex::new(Vec::new()),
        }
    }

    /// Every spec this engine was asked to run, in order.
    pub fn launches(&self) -> Vec<RunSpec> {
        self.launches.lock().unwrap().clone()
    }
}

impl Default for FakeRunEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunEngine for FakeRunEngine {
    async fn run(&self, spec: &RunSpec) -> Result<SubmittedRun, EngineError> {
        self.launches.lock().unwrap().push(spec.clone());
        match &self.outcome {
            Outcome::Succeed(Some(run_id)) => Ok(SubmittedRun {
                run_id: run_id.clone(),
            }),
            Outcome::Succeed(None) => Ok(SubmittedRun {
                run_id: uuid::Uuid::new_v4().simple().to_string(),
            }),
            Outcome::Fail(reason) => Err(EngineError::Rejected(reason.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryTrackingClient
// ---------------------------------------------------------------------------

/// Tracking client backed by a `HashMap<run_id, RunInfo>`.
#[derive(Debug, Default)]
pub struct MemoryTrackingClient {
    runs: Mutex<HashMap<String, RunInfo>>,
}

impl MemoryTrackingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a finished run with the given artifact root.
    pub fn insert_run(&self, run_id: &str, artifact_uri: &str) {
        let info = RunInfo {
            run_id: run_id.to_string(),
            experiment_id: "0".to_string(),
            status: Some("FINISHED".to_string()),
            artifact_uri: artifact_uri.to_string(),
        };
        self.runs.lock().unwrap().insert(run_id.to_string(), info);
    }
}

#[async_trait]
impl TrackingClient for MemoryTrackingClient {
    async fn get_run(&self, run_id: &str) -> Result<RunInfo, TrackingError> {
        self.runs
            .lock()
            .unwrap()
            .get(run_id)
            .cloned()
            .ok_or_else(|| TrackingError::RunNotFound(run_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn spec() -> RunSpec {
        RunSpec {
            workdir: PathBuf::from("."),
            entrypoint: "main".to_string(),
            experiment: String::new(),
            parameters: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_fake_engine_records_launches() {
        let engine = FakeRunEngine::succeeding("run-1");
        let run = engine.run(&spec()).await.unwrap();
        assert_eq!(run.run_id, "run-1");
        assert_eq!(engine.launches(), vec![spec()]);
    }

    #[tokio::test]
    async fn test_fake_engine_generates_ids() {
        let engine = FakeRunEngine::new();
        let a = engine.run(&spec()).await.unwrap();
        let b = engine.run(&spec()).await.unwrap();
        assert_eq!(a.run_id.len(), 32);
        assert_ne!(a.run_id, b.run_id);
    }

    #[tokio::test]
    async fn test_memory_tracking_roundtrip() {
        let client = MemoryTrackingClient::new();
        client.insert_run("r", "s3://bucket/r");
        assert_eq!(client.get_run("r").await.unwrap().artifact_uri, "s3://bucket/r");
        assert!(matches!(
            client.get_run("missing").await,
            Err(TrackingError::RunNotFound(_))
        ));
    }
}
