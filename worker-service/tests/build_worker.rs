// Integration tests for running a build through the worker facade

mod common;

use std::sync::Arc;

use common::RecordingCoordinator;
use worker_service::{
    halt_channel, BuildWorker, GraphDocument, NodeStatus, RunOutcome, ServiceError, WorkerConfig,
    END,
};

const GRAPH: &str = r#"
nodes:
  - name: prepare
    work:
      type: shell
      commands:
        - mkdir -p deps
        - echo "$SHIFT_BUILDID" > deps/build-id
  - name: compile
    description: build the project
    depends_on: [prepare]
    work:
      type: plugin
      name: shell
      params:
        commands: ["test -f deps/build-id"]
"#;

fn config(work: &std::path::Path, storage: &std::path::Path) -> WorkerConfig {
    WorkerConfig {
        work_dir: work.to_path_buf(),
        storage_dir: storage.to_path_buf(),
        parallelism: Some(2),
        cache_dirs: vec!["deps".into()],
        ..WorkerConfig::new("build-77")
    }
}

#[tokio::test]
async fn test_project_fetch_failure_is_fatal() {
    let work = tempfile::tempdir().unwrap();
    let storage = tempfile::tempdir().unwrap();
    let coordinator = Arc::new(RecordingCoordinator::failing_project());
    let graph = Arc::new(GraphDocument::from_yaml(GRAPH).unwrap().into_graph().unwrap());
    let (_halt_tx, halt_rx) = halt_channel();

    let worker = BuildWorker::new(config(work.path(), storage.path()), coordinator.clone());
    let err = worker.run(Arc::clone(&graph), halt_rx).await.unwrap_err();

    assert!(matches!(err, ServiceError::Project(_)));
    assert!(coordinator.updates().is_empty());
    assert!(graph.nodes().iter().all(|n| n.status() == NodeStatus::Pending));
}

#[tokio::test]
async fn test_runs_shell_graph_and_saves_cache() {
    let work = tempfile::tempdir().unwrap();
    let storage = tempfile::tempdir().unwrap();
    let coordinator = Arc::new(RecordingCoordinator::default());
    let graph = Arc::new(GraphDocument::from_yaml(GRAPH).unwrap().into_graph().unwrap());
    let (_halt_tx, halt_rx) = halt_channel();

    let worker = BuildWorker::new(config(work.path(), storage.path()), coordinator.clone());
    let result = worker.run(Arc::clone(&graph), halt_rx).await.unwrap();

    assert_eq!(result.outcome, RunOutcome::Succeeded);
    assert_eq!(graph.node(END).unwrap().status(), NodeStatus::Succeeded);

    let written = std::fs::read_to_string(work.path().join("deps").join("build-id")).unwrap();
    assert_eq!(written.trim(), "build-77");

    let cached = storage
        .path()
        .join("cache")
        .join("build-77")
        .join("deps")
        .join("build-id");
    assert!(cached.exists());

    let last = coordinator.updates().pop().unwrap();
    assert_eq!(last.status, NodeStatus::Succeeded);
    assert_eq!(last.checkpoint, END);
}
