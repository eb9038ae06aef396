// Execution Events
// Progress reporting and event types for build graph execution

use crate::execution::halt::HaltCommand;
use crate::execution::walker::RunOutcome;
use crate::lifecycle::NodeStatus;

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while a build graph is walked
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Walk started
    RunStarted {
        build_id: String,
        total_checkpoints: usize,
        parallelism: usize,
    },

    /// Checkpoint reached
    CheckpointStarted {
        index: usize,
        label: String,
        width: usize,
    },

    /// A node changed status
    NodeStatusChanged {
        node: String,
        status: NodeStatus,
        message: Option<String>,
    },

    /// Shell command about to run
    CommandStarted {
        node: String,
        description: String,
        command: String,
    },

    /// Line of command output (stdout/stderr)
    NodeOutput {
        node: String,
        line: String,
        is_error: bool,
    },

    /// Shell command finished
    CommandCompleted {
        node: String,
        description: String,
        command: String,
        exit_code: Option<i32>,
        duration: Duration,
    },

    /// Build failed and the walker is waiting for a halt command
    HaltWaiting { checkpoint: String },

    /// Halt command received from the coordinator
    HaltReceived { command: HaltCommand },

    /// Walk finished
    RunCompleted {
        outcome: RunOutcome,
        duration: Duration,
    },
}

impl ExecutionEvent {
    pub fn run_started(build_id: impl Into<String>, total_checkpoints: usize, parallelism: usize) -> Self {
        Self::RunStarted {
            build_id: build_id.into(),
            total_checkpoints,
            parallelism,
        }
    }

    pub fn checkpoint_started(index: usize, label: impl Into<String>, width: usize) -> Self {
        Self::CheckpointStarted {
            index,
            label: label.into(),
            width,
        }
    }

    pub fn node_status(node: impl Into<String>, status: NodeStatus, message: Option<String>) -> Self {
        Self::NodeStatusChanged {
            node: node.into(),
            status,
            message,
        }
    }

    pub fn node_output(node: impl Into<String>, line: impl Into<String>, is_error: bool) -> Self {
        Self::NodeOutput {
            node: node.into(),
            line: line.into(),
            is_error,
        }
    }

    /// Create a run completed event
    pub fn run_completed(outcome: RunOutcome, duration: Duration) -> Self {
        Self::RunCompleted { outcome, duration }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
