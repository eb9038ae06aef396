// Coordinator Client
// Interface to the coordinator that owns the build

use crate::lifecycle::NodeStatus;

use thiserror::Error;

/// Project metadata the coordinator returns for a build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    pub team_id: String,
    pub language: String,
    pub clone_url: String,
    pub branch: String,
    pub source: String,
}

/// One status report: the whole graph plus the checkpoint that triggered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub build_id: String,
    /// JSON snapshot of the graph
    pub graph: String,
    pub status: NodeStatus,
    pub checkpoint: String,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to connect to coordinator at {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("coordinator call failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("coordinator unavailable: {0}")]
    Unavailable(String),
}

/// Calls the worker makes into the coordinator
#[async_trait::async_trait]
pub trait Coordinator: Send + Sync {
    async fn get_project(&self, build_id: &str) -> Result<ProjectInfo, CoordinatorError>;

    async fn update_build_status(&self, update: StatusUpdate) -> Result<(), CoordinatorError>;
}
