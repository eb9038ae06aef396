// Shared fixtures for build graph integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use worker_service::{
    CacheError, CachePersister, CacheSummary, Coordinator, CoordinatorError, LogSink, NodeStatus,
    ProjectInfo, StatusUpdate, StepExecutor, StepFailure, WorkItem,
};

/// Coordinator that records every status update
#[derive(Default)]
pub struct RecordingCoordinator {
    updates: Mutex<Vec<StatusUpdate>>,
    pub project_error: bool,
}

impl RecordingCoordinator {
    pub fn failing_project() -> Self {
        Self {
            project_error: true,
            ..Self::default()
        }
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// (status, checkpoint) pairs in report order
    pub fn trail(&self) -> Vec<(NodeStatus, String)> {
        self.updates()
            .into_iter()
            .map(|u| (u.status, u.checkpoint))
            .collect()
    }
}

#[async_trait::async_trait]
impl Coordinator for RecordingCoordinator {
    async fn get_project(&self, build_id: &str) -> Result<ProjectInfo, CoordinatorError> {
        if self.project_error {
            return Err(CoordinatorError::Unavailable("project lookup refused".to_string()));
        }
        Ok(ProjectInfo {
            id: build_id.to_string(),
            name: "demo".to_string(),
            ..ProjectInfo::default()
        })
    }

    async fn update_build_status(&self, update: StatusUpdate) -> Result<(), CoordinatorError> {
        self.updates.lock().unwrap().push(update);
        Ok(())
    }
}

/// Executor with per-node delays and failures, tracking concurrency
#[derive(Default)]
pub struct ScriptedExecutor {
    delays: HashMap<String, Duration>,
    failures: Vec<String>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub started: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, node: &str, delay: Duration) -> Self {
        self.delays.insert(node.to_string(), delay);
        self
    }

    pub fn fail(mut self, node: &str) -> Self {
        self.failures.push(node.to_string());
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, item: &WorkItem, sink: &LogSink) -> Result<(), StepFailure> {
        if matches!(item, WorkItem::Marker) {
            return Ok(());
        }
        let node = sink.node().to_string();
        self.started.lock().unwrap().push(node.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&node) {
            tokio::time::sleep(*delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failures.contains(&node) {
            sink.line("scripted failure", true);
            return Err(StepFailure::new(
                format!("node {} failed", node),
                "scripted failure",
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingCache {
    pub calls: AtomicUsize,
}

impl CountingCache {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CachePersister for CountingCache {
    async fn persist(&self, _build_id: &str) -> Result<CacheSummary, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CacheSummary::default())
    }
}
