// Worker Service Library
// Build graph execution engine for the shift worker

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod graph;
pub mod grpc;
pub mod lifecycle;
pub mod reporter;
pub mod runners;
pub mod utils;
pub mod worker;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

pub use cache::{CacheError, CachePersister, CacheSummary, DirectoryCache, NoopCache};
pub use config::{ConfigError, WorkerConfig};
pub use coordinator::{Coordinator, CoordinatorError, ProjectInfo, StatusUpdate};

// Re-export graph types
pub use graph::{
    Checkpoint, CheckpointPlan, Graph, GraphBuilder, GraphDocument, GraphError, GraphErrorKind,
    GraphSnapshot, Node, NodeSpec, WorkItem, END, START,
};
pub use lifecycle::{Lifecycle, LifecycleError, NodeState, NodeStatus, ReadinessGate};

// Re-export execution types
pub use execution::{
    halt_channel, progress_channel, CheckpointWalker, ExecutionEvent, HaltCommand, HaltReceiver,
    HaltSender, ProgressSender, RunOutcome, WalkError, WalkResult, WalkerConfig, WorkerPool,
};

pub use grpc::GrpcCoordinator;
pub use reporter::{ReportOutcome, StatusReporter};
pub use runners::{ExecutorRegistry, LogSink, ShellExecutor, StepExecutor, StepFailure};
pub use worker::BuildWorker;
