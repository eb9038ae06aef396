// Checkpoint Walker
// Executes a build graph checkpoint by checkpoint, fanning out where allowed

use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::halt::{HaltCommand, HaltReceiver};
use crate::execution::pool::WorkerPool;
use crate::graph::{Checkpoint, Edge, Graph, Node};
use crate::lifecycle::{LifecycleError, NodeStatus};
use crate::reporter::StatusReporter;
use crate::runners::{LogSink, StepExecutor};

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Pool size for a machine with `units` processing units: one is left for
/// the worker itself, but never fewer than one slot.
pub fn parallelism_for(units: usize) -> usize {
    units.saturating_sub(1).max(1)
}

pub fn default_parallelism() -> usize {
    parallelism_for(num_cpus::get())
}

#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Maximum number of fan-out nodes running at once
    pub parallelism: usize,
    /// How long to wait for a halt command (None = forever)
    pub halt_timeout: Option<Duration>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            halt_timeout: None,
        }
    }
}

/// How a walk ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// Every checkpoint ran but at least one node failed
    Failed { at: String },
    /// The walk stopped after the failure at `at`
    Halted { at: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }

    /// First node that failed, if any
    pub fn failed_at(&self) -> Option<&str> {
        match self {
            RunOutcome::Succeeded => None,
            RunOutcome::Failed { at } | RunOutcome::Halted { at } => Some(at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalkResult {
    pub outcome: RunOutcome,
    /// Failed nodes, in the order their checkpoints finished
    pub failed_nodes: Vec<String>,
    pub duration: Duration,
}

/// Conditions that abort the walk itself
#[derive(Debug, Error)]
pub enum WalkError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("execution unit panicked: {0}")]
    UnitPanicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOutcome {
    Succeeded,
    Failed,
    /// Left in Waiting because a sibling had already failed
    Withheld,
}

/// Everything an execution unit needs, shared across pool workers
#[derive(Clone)]
struct UnitContext {
    graph: Arc<Graph>,
    executor: Arc<dyn StepExecutor>,
    reporter: Arc<StatusReporter>,
    events: Option<ProgressSender>,
}

impl UnitContext {
    async fn publish(&self, node: &Node, status: NodeStatus) {
        self.events
            .send_event(ExecutionEvent::node_status(node.name(), status, node.message()));
        self.reporter.report(&self.graph, status, node.name()).await;
    }

    /// Run a node that is already Waiting through Running to a terminal
    /// status. On failure `failure_flag` is tripped before the report goes out.
    async fn execute(
        &self,
        index: usize,
        failure_flag: Option<&CancellationToken>,
    ) -> Result<UnitOutcome, LifecycleError> {
        let node = self.graph.node_at(index);
        node.lifecycle().start()?;
        self.publish(node, NodeStatus::Running).await;

        let sink = LogSink::new(node.name(), node.description(), self.events.clone());
        match self.executor.execute(node.work(), &sink).await {
            Ok(()) => {
                node.lifecycle().succeed()?;
                info!(node = %node.name(), "node succeeded");
                self.publish(node, NodeStatus::Succeeded).await;
                Ok(UnitOutcome::Succeeded)
            }
            Err(failure) => {
                node.lifecycle().fail(failure.message())?;
                if let Some(flag) = failure_flag {
                    flag.cancel();
                }
                warn!(node = %node.name(), error = %failure, "node failed");
                self.publish(node, NodeStatus::Failed).await;
                Ok(UnitOutcome::Failed)
            }
        }
    }
}

/// One node of a fan-out checkpoint, run on a pool worker
async fn run_unit(
    ctx: Arc<UnitContext>,
    edge: Edge,
    failure_flag: CancellationToken,
) -> Result<UnitOutcome, LifecycleError> {
    let node = ctx.graph.node_at(edge.target);

    // Nodes withheld by an earlier pass are already Waiting.
    if node.status() == NodeStatus::Pending {
        let gate = ctx.graph.readiness_gate(edge.target);
        tokio::select! {
            biased;
            _ = gate.resolved() => {}
            // An upstream sibling may itself be withheld and never finish.
            _ = failure_flag.cancelled() => {
                info!(node = %node.name(), "sibling failed before dependencies resolved");
                return Ok(UnitOutcome::Withheld);
            }
        }
        node.lifecycle().mark_waiting()?;
        ctx.publish(node, NodeStatus::Waiting).await;
    }

    if failure_flag.is_cancelled() {
        info!(node = %node.name(), "sibling failed, not starting node");
        return Ok(UnitOutcome::Withheld);
    }

    ctx.execute(edge.target, Some(&failure_flag)).await
}

/// Result of running a checkpoint once
#[derive(Debug, Default)]
struct CheckpointPass {
    /// Nodes that failed during this pass, in edge order
    failed: Vec<String>,
    /// Fan-out edges left Pending or Waiting after a sibling failed
    unfinished: Vec<Edge>,
}

/// Walks a graph's checkpoints in order.
///
/// A sequential checkpoint runs its node directly. A fan-out checkpoint runs
/// its nodes on a bounded worker pool and waits for all of them. Once any
/// node fails, the walker suspends before the next checkpoint until the
/// coordinator sends a halt command. `Continue` first finishes any fan-out
/// nodes the failure kept from starting, then moves on.
pub struct CheckpointWalker {
    graph: Arc<Graph>,
    executor: Arc<dyn StepExecutor>,
    reporter: Arc<StatusReporter>,
    halt_rx: HaltReceiver,
    config: WalkerConfig,
    event_tx: Option<ProgressSender>,
}

impl CheckpointWalker {
    pub fn new(
        graph: Arc<Graph>,
        executor: Arc<dyn StepExecutor>,
        reporter: Arc<StatusReporter>,
        halt_rx: HaltReceiver,
    ) -> Self {
        Self {
            graph,
            executor,
            reporter,
            halt_rx,
            config: WalkerConfig::default(),
            event_tx: None,
        }
    }

    pub fn with_config(mut self, config: WalkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    fn unit_context(&self) -> UnitContext {
        UnitContext {
            graph: Arc::clone(&self.graph),
            executor: Arc::clone(&self.executor),
            reporter: Arc::clone(&self.reporter),
            events: self.event_tx.clone(),
        }
    }

    #[instrument(name = "walk", skip(self), fields(build_id = %self.reporter.build_id()))]
    pub async fn walk(mut self) -> Result<WalkResult, WalkError> {
        let started = Instant::now();
        let pool = WorkerPool::new(self.config.parallelism);
        let ctx = Arc::new(self.unit_context());
        let total = self.graph.checkpoints().len();

        info!(checkpoints = total, parallelism = pool.size(), "build started");
        self.event_tx.send_event(ExecutionEvent::run_started(
            self.reporter.build_id(),
            total,
            pool.size(),
        ));

        let mut failed_nodes = Vec::new();
        let mut failed = false;
        let mut halted = false;

        for index in 0..total {
            let checkpoint = self.graph.checkpoints()[index].clone();
            let label = self.graph.checkpoint_label(&checkpoint);
            self.event_tx.send_event(ExecutionEvent::checkpoint_started(
                index,
                label.clone(),
                checkpoint.targets().len(),
            ));

            let mut pass = match checkpoint {
                Checkpoint::Sequential(node) => run_sequential(&ctx, node).await?,
                Checkpoint::FanOut(edges) => run_fan_out(&ctx, &pool, edges).await?,
            };

            loop {
                if !pass.failed.is_empty() {
                    failed = true;
                    failed_nodes.append(&mut pass.failed);
                }
                let work_remains = !pass.unfinished.is_empty() || index + 1 < total;
                if !failed || !work_remains {
                    break;
                }

                match self.await_halt(&label).await {
                    HaltCommand::Continue => {
                        info!("continuing build after failure");
                        failed = false;
                        if pass.unfinished.is_empty() {
                            break;
                        }
                        let unfinished = std::mem::take(&mut pass.unfinished);
                        info!(nodes = unfinished.len(), "resuming unfinished nodes");
                        pass = run_fan_out(&ctx, &pool, unfinished).await?;
                    }
                    HaltCommand::Halt => {
                        info!("build halted");
                        halted = true;
                        break;
                    }
                }
            }
            if halted {
                break;
            }
        }

        let outcome = match (halted, failed_nodes.first()) {
            (true, Some(at)) => RunOutcome::Halted { at: at.clone() },
            (false, Some(at)) => RunOutcome::Failed { at: at.clone() },
            (_, None) => RunOutcome::Succeeded,
        };

        if let Some(at) = outcome.failed_at() {
            self.reporter
                .report(&self.graph, NodeStatus::Failed, at)
                .await;
        }

        let duration = started.elapsed();
        info!(outcome = ?outcome, elapsed = ?duration, "build finished");
        self.event_tx
            .send_event(ExecutionEvent::run_completed(outcome.clone(), duration));

        Ok(WalkResult {
            outcome,
            failed_nodes,
            duration,
        })
    }

    async fn await_halt(&mut self, checkpoint: &str) -> HaltCommand {
        info!(checkpoint, "build failed, waiting for a halt command");
        self.event_tx.send_event(ExecutionEvent::HaltWaiting {
            checkpoint: checkpoint.to_string(),
        });

        let command = match self.config.halt_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.halt_rx.recv()).await {
                Ok(command) => command.unwrap_or(HaltCommand::Halt),
                Err(_) => {
                    warn!(timeout = ?limit, "no halt command received, halting");
                    HaltCommand::Halt
                }
            },
            // A closed channel can never deliver Continue.
            None => self.halt_rx.recv().await.unwrap_or(HaltCommand::Halt),
        };

        self.event_tx
            .send_event(ExecutionEvent::HaltReceived { command });
        command
    }
}

async fn run_sequential(ctx: &UnitContext, index: usize) -> Result<CheckpointPass, WalkError> {
    let node = ctx.graph.node_at(index);
    ctx.graph.readiness_gate(index).resolved().await;
    node.lifecycle().mark_waiting()?;

    let mut pass = CheckpointPass::default();
    if ctx.execute(index, None).await? == UnitOutcome::Failed {
        pass.failed.push(node.name().to_string());
    }
    Ok(pass)
}

/// Run `edges` on the pool until they finish or a failure stops new starts
async fn run_fan_out(
    ctx: &Arc<UnitContext>,
    pool: &WorkerPool,
    edges: Vec<Edge>,
) -> Result<CheckpointPass, WalkError> {
    let failure_flag = CancellationToken::new();
    let unit_ctx = Arc::clone(ctx);
    let unit_flag = failure_flag.clone();

    let results = pool
        .run(edges.clone(), &failure_flag, move |edge| {
            run_unit(Arc::clone(&unit_ctx), edge, unit_flag.clone())
        })
        .await
        .map_err(|e| WalkError::UnitPanicked(e.to_string()))?;
    for result in results {
        result?;
    }

    let mut pass = CheckpointPass::default();
    for edge in edges {
        let node = ctx.graph.node_at(edge.target);
        match node.status() {
            NodeStatus::Failed => pass.failed.push(node.name().to_string()),
            status if !status.is_terminal() => pass.unfinished.push(edge),
            _ => {}
        }
    }
    Ok(pass)
}
