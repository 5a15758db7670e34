//! Drives `MlflowCliEngine` against shell scripts standing in for `mlflow`.
#![cfg(unix)]

use mlflow_client::{
    EngineConfig, EngineError, LazyTrackingClient, MlflowCliEngine, RunEngine, RunSpec,
    TrackingClient, TrackingConfig, TrackingError,
};
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn run_spec(workdir: &Path) -> RunSpec {
    let mut parameters = BTreeMap::new();
    parameters.insert("alpha".to_string(), "0.5".to_string());
    RunSpec {
        workdir: workdir.to_path_buf(),
        entrypoint: "main".to_string(),
        experiment: "wine-quality".to_string(),
        parameters,
    }
}

/// Scripts are written and executed from a single test so no other thread
/// can hold a writable descriptor to them while they are exec'd.
#[tokio::test]
async fn test_engine_against_stub_executables() {
    let dir = tempfile::tempdir().unwrap();
    let args_file = dir.path().join("args.txt");

    // Successful run reports its ID on stderr
    let ok = write_script(
        dir.path(),
        "mlflow-ok",
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\n\
             echo \"INFO mlflow.projects: === Running command 'python train.py' ===\" >&2\n\
             echo \"INFO mlflow.projects: === Run (ID 'cafe01') succeeded ===\" >&2",
            args_file.display()
        ),
    );
    let engine = MlflowCliEngine::new(EngineConfig::new(ok.to_str().unwrap()));
    let run = engine.run(&run_spec(dir.path())).await.expect("run failed");
    assert_eq!(run.run_id, "cafe01");

    let recorded = std::fs::read_to_string(&args_file).unwrap();
    let recorded: Vec<&str> = recorded.lines().collect();
    assert_eq!(recorded[0], "run");
    assert_eq!(recorded[1], dir.path().to_str().unwrap());
    assert!(recorded.windows(2).any(|w| w == ["-e", "main"]));
    assert!(recorded.windows(2).any(|w| w == ["--experiment-name", "wine-quality"]));
    assert!(recorded.windows(2).any(|w| w == ["-P", "alpha=0.5"]));

    // Failing run surfaces exit code and the run ID it managed to report
    let failing = write_script(
        dir.path(),
        "mlflow-fail",
        "echo \"=== Run (ID 'dead02') failed ===\" >&2\nexit 3",
    );
    let engine = MlflowCliEngine::new(EngineConfig::new(failing.to_str().unwrap()));
    let err = engine.run(&run_spec(dir.path())).await.unwrap_err();
    match err {
        EngineError::RunFailed { exit_code, run_id } => {
            assert_eq!(exit_code, Some(3));
            assert_eq!(run_id.as_deref(), Some("dead02"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Success without a banner cannot be traced back to a run
    let silent = write_script(dir.path(), "mlflow-silent", "exit 0");
    let engine = MlflowCliEngine::new(EngineConfig::new(silent.to_str().unwrap()));
    let err = engine.run(&run_spec(dir.path())).await.unwrap_err();
    assert!(matches!(err, EngineError::MissingRunId), "got {err:?}");

    // Database-backed stores are read back through `mlflow runs describe`
    let describe = write_script(
        dir.path(),
        "mlflow-describe",
        "[ \"$1 $2 $3\" = \"runs describe --run-id\" ] || exit 9\n\
         [ \"$MLFLOW_TRACKING_URI\" = \"sqlite:///mlflow.db\" ] || exit 8\n\
         if [ \"$4\" != \"cafe01\" ]; then echo \"Run '$4' not found\" >&2; exit 1; fi\n\
         echo 'Some warning line'\n\
         echo '{\"info\": {\"run_id\": \"cafe01\", \"experiment_id\": \"1\", \"status\": \"FINISHED\", \"artifact_uri\": \"s3://bucket/1/cafe01/artifacts\"}, \"data\": {}}'",
    );
    let tracking = LazyTrackingClient::new(
        TrackingConfig::new("sqlite:///mlflow.db").with_executable(describe.to_str().unwrap()),
    );
    let info = tracking.get_run("cafe01").await.expect("describe failed");
    assert_eq!(info.artifact_uri, "s3://bucket/1/cafe01/artifacts");
    assert_eq!(info.status.as_deref(), Some("FINISHED"));

    let err = tracking.get_run("other").await.unwrap_err();
    match err {
        TrackingError::CommandFailed(stderr) => assert!(stderr.contains("not found"), "{stderr}"),
        other => panic!("unexpected error: {other:?}"),
    }
}
