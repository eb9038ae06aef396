// Execution Engine Module
// Walks checkpoints, runs fan-out nodes on a bounded pool, and handles halt-wait

pub mod events;
pub mod halt;
pub mod pool;
pub mod walker;

// Re-export key types
pub use events::{progress_channel, EventSender, ExecutionEvent, ProgressReceiver, ProgressSender};
pub use halt::{halt_channel, HaltCommand, HaltReceiver, HaltSender};
pub use pool::WorkerPool;
pub use walker::{
    default_parallelism, parallelism_for, CheckpointWalker, RunOutcome, WalkError, WalkResult,
    WalkerConfig,
};
