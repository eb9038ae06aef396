// Node Lifecycle
// Per-node state machine and the readiness gates built on top of it

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

/// Status of a single build node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Constructed, not yet eligible to run
    #[default]
    Pending,
    /// Dependencies satisfied, eligible for an execution slot
    Waiting,
    Running,
    Succeeded,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Succeeded | NodeStatus::Failed)
    }

    /// Whether `next` is the legal successor of this status
    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        matches!(
            (self, next),
            (NodeStatus::Pending, NodeStatus::Waiting)
                | (NodeStatus::Waiting, NodeStatus::Running)
                | (NodeStatus::Running, NodeStatus::Succeeded)
                | (NodeStatus::Running, NodeStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Waiting => "waiting",
            NodeStatus::Running => "running",
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of a node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeState {
    pub status: NodeStatus,
    /// Diagnostic output captured when the node failed
    pub message: Option<String>,
}

/// Lifecycle precondition violations. These are programming errors in the
/// caller, never runtime conditions of the build itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("node '{node}' cannot move from {from} to {to}")]
    InvalidTransition {
        node: String,
        from: NodeStatus,
        to: NodeStatus,
    },
}

/// State machine owning the mutable status of one node.
///
/// The state lives in a `watch` channel so that snapshots can read it at any
/// time and downstream readiness gates can await its terminal status.
#[derive(Debug)]
pub struct Lifecycle {
    node: String,
    state: watch::Sender<NodeState>,
}

impl Lifecycle {
    pub fn new(node: impl Into<String>) -> Self {
        let (state, _) = watch::channel(NodeState::default());
        Self {
            node: node.into(),
            state,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> NodeStatus {
        self.state.borrow().status
    }

    pub fn message(&self) -> Option<String> {
        self.state.borrow().message.clone()
    }

    /// `Pending -> Waiting`: the readiness gate resolved
    pub fn mark_waiting(&self) -> Result<(), LifecycleError> {
        self.advance(NodeStatus::Waiting, None)
    }

    /// `Waiting -> Running`: an execution slot was granted
    pub fn start(&self) -> Result<(), LifecycleError> {
        self.advance(NodeStatus::Running, None)
    }

    pub fn succeed(&self) -> Result<(), LifecycleError> {
        self.advance(NodeStatus::Succeeded, None)
    }

    pub fn fail(&self, message: impl Into<String>) -> Result<(), LifecycleError> {
        self.advance(NodeStatus::Failed, Some(message.into()))
    }

    /// Subscribe to state changes
    pub fn watch(&self) -> watch::Receiver<NodeState> {
        self.state.subscribe()
    }

    fn advance(&self, next: NodeStatus, message: Option<String>) -> Result<(), LifecycleError> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if !state.status.can_transition_to(next) {
                result = Err(LifecycleError::InvalidTransition {
                    node: self.node.clone(),
                    from: state.status,
                    to: next,
                });
                return false;
            }
            state.status = next;
            if message.is_some() {
                state.message = message;
            }
            true
        });
        result
    }
}

/// Resolves once every upstream node has reached a terminal status
#[derive(Debug)]
pub struct ReadinessGate {
    upstream: Vec<watch::Receiver<NodeState>>,
}

impl ReadinessGate {
    pub fn new(upstream: Vec<watch::Receiver<NodeState>>) -> Self {
        Self { upstream }
    }

    /// A gate with no upstream dependencies
    pub fn open() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_resolved(&self) -> bool {
        self.upstream
            .iter()
            .all(|rx| rx.borrow().status.is_terminal())
    }

    pub async fn resolved(mut self) {
        for rx in &mut self.upstream {
            // A closed channel means the upstream node is gone; nothing to wait on.
            let _ = rx.wait_for(|state| state.status.is_terminal()).await;
        }
    }
}
