// Status Reporter
// Sends graph snapshots to the coordinator and saves the cache on completion

use crate::cache::{CachePersister, NoopCache};
use crate::coordinator::{Coordinator, StatusUpdate};
use crate::graph::{Graph, END};
use crate::lifecycle::NodeStatus;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one report attempt. Delivery failures are never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Delivered,
    /// No coordinator configured
    Skipped,
    Failed(String),
}

pub struct StatusReporter {
    build_id: String,
    coordinator: Option<Arc<dyn Coordinator>>,
    cache: Arc<dyn CachePersister>,
    cache_saved: AtomicBool,
}

impl StatusReporter {
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            coordinator: None,
            cache: Arc::new(NoopCache),
            cache_saved: AtomicBool::new(false),
        }
    }

    pub fn with_coordinator(mut self, coordinator: Arc<dyn Coordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CachePersister>) -> Self {
        self.cache = cache;
        self
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn cache_saved(&self) -> bool {
        self.cache_saved.load(Ordering::SeqCst)
    }

    /// Report the current graph, tagged with `status` and the checkpoint
    /// (node name) that triggered the report.
    ///
    /// The first `Failed` report, or a `Succeeded` report for END, saves the
    /// cache before the report is sent.
    pub async fn report(&self, graph: &Graph, status: NodeStatus, checkpoint: &str) -> ReportOutcome {
        if status == NodeStatus::Failed || (status == NodeStatus::Succeeded && checkpoint == END) {
            self.persist_cache_once().await;
        }

        let Some(coordinator) = &self.coordinator else {
            debug!(checkpoint, %status, "no coordinator configured, skipping report");
            return ReportOutcome::Skipped;
        };

        let update = StatusUpdate {
            build_id: self.build_id.clone(),
            graph: graph_payload(graph.to_json()),
            status,
            checkpoint: checkpoint.to_string(),
        };

        match coordinator.update_build_status(update).await {
            Ok(()) => {
                debug!(checkpoint, %status, "build graph reported");
                ReportOutcome::Delivered
            }
            Err(e) => {
                warn!(checkpoint, %status, error = %e, "failed to update build graph");
                ReportOutcome::Failed(e.to_string())
            }
        }
    }

    async fn persist_cache_once(&self) {
        if self.cache_saved.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(build_id = %self.build_id, "saving cache");
        match self.cache.persist(&self.build_id).await {
            Ok(summary) => info!(
                saved = summary.saved.len(),
                skipped = summary.skipped.len(),
                "finished saving the cache"
            ),
            Err(e) => warn!(error = %e, "failed to save cache"),
        }
    }
}

/// Serialized graph for a report; the status still goes out when the
/// snapshot cannot be encoded.
fn graph_payload(json: Result<String, serde_json::Error>) -> String {
    json.unwrap_or_else(|e| {
        warn!(error = %e, "failed to serialize build graph, reporting without it");
        String::new()
    })
}
