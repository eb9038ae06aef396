use crate::output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use worker_rpc::RpcServer;
use worker_service::config::{DEFAULT_COORDINATOR_PORT, DEFAULT_WORKER_PORT};
use worker_service::utils::default_storage_dir;
use worker_service::{
    halt_channel, progress_channel, BuildWorker, ExecutionEvent, GraphDocument, HaltCommand,
    NodeStatus, RunOutcome, WorkerConfig,
};

/// Run a build graph on this worker
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the build graph (YAML or JSON)
    #[arg(long, env = "SHIFT_GRAPH", value_name = "FILE")]
    pub graph: PathBuf,

    /// Build identifier assigned by the coordinator
    #[arg(long = "build-id", env = "SHIFT_BUILDID")]
    pub build_id: String,

    /// Team that owns the build
    #[arg(long = "team-id", env = "SHIFT_TEAMID", default_value = "")]
    pub team_id: String,

    /// Coordinator host
    #[arg(long, env = "SHIFT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Coordinator port
    #[arg(long, env = "SHIFT_PORT", default_value_t = DEFAULT_COORDINATOR_PORT)]
    pub port: u16,

    /// Port for the halt control server
    #[arg(long = "worker-port", env = "WORKER_PORT", default_value_t = DEFAULT_WORKER_PORT)]
    pub worker_port: u16,

    /// Storage root for caches (default: ~/.shift/storage)
    #[arg(long = "storage-dir", env = "SHIFT_DIR", value_name = "DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Working directory for build commands (default: <storage>/workspace)
    #[arg(long = "work-dir", short = 'w', env = "SHIFT_WORKDIR", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Maximum concurrent fan-out nodes (default: CPU count - 1)
    #[arg(long, env = "SHIFT_PARALLEL")]
    pub parallel: Option<usize>,

    /// Directories to save when the build finishes (comma separated)
    #[arg(long = "cache-dir", env = "SHIFT_CACHE_DIRS", value_delimiter = ',', value_name = "DIR")]
    pub cache_dirs: Vec<PathBuf>,

    /// Stop waiting for a halt command after this many seconds
    #[arg(long = "halt-timeout", value_name = "SECS")]
    pub halt_timeout: Option<u64>,

    /// Kill any single command running longer than this many seconds
    #[arg(long = "step-timeout", value_name = "SECS")]
    pub step_timeout: Option<u64>,
}

impl RunArgs {
    fn to_config(&self) -> WorkerConfig {
        let storage_dir = self.storage_dir.clone().unwrap_or_else(default_storage_dir);
        let work_dir = self
            .work_dir
            .clone()
            .unwrap_or_else(|| storage_dir.join("workspace"));

        WorkerConfig {
            coordinator_host: self.host.clone(),
            coordinator_port: self.port,
            build_id: self.build_id.clone(),
            team_id: self.team_id.clone(),
            work_dir,
            storage_dir,
            worker_port: self.worker_port,
            parallelism: self.parallel,
            halt_timeout: self.halt_timeout.map(Duration::from_secs),
            step_timeout: self.step_timeout.map(Duration::from_secs),
            cache_dirs: self.cache_dirs.clone(),
            ..WorkerConfig::default()
        }
    }
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = args.to_config();
    config.validate()?;

    output::status("Loading", &format!("{}", args.graph.display()));
    let document = GraphDocument::from_file(&args.graph)?;
    let graph_name = document.name.clone().unwrap_or_else(|| config.build_id.clone());
    let graph = Arc::new(document.into_graph()?);
    output::info(&format!(
        "Build graph '{}': {} nodes, {} checkpoints",
        graph_name,
        graph.nodes().len(),
        graph.checkpoints().len()
    ));

    output::status("Connecting", &config.coordinator_endpoint());
    let worker = BuildWorker::connect(config.clone())
        .await
        .wrap_err("failed to reach the coordinator")?;

    let (halt_tx, halt_rx) = halt_channel();
    let shutdown = CancellationToken::new();
    let server = RpcServer::new(config.build_id.clone(), halt_tx);
    let server_handle = tokio::spawn(server.serve(config.worker_addr(), shutdown.clone()));
    info!(
        build_id = %config.build_id,
        addr = %config.worker_addr(),
        "control server started"
    );

    let (tx, mut rx) = progress_channel();
    let worker = worker.with_progress(tx);
    let run_handle = tokio::spawn(async move { worker.run(graph, halt_rx).await });

    while let Some(event) = rx.recv().await {
        render(&event);
    }

    let result = run_handle.await?;
    shutdown.cancel();
    match server_handle.await {
        Ok(Err(e)) => warn!(error = %e, "control server stopped with an error"),
        Err(e) => warn!(error = %e, "control server task failed"),
        Ok(Ok(())) => {}
    }

    let result = result?;
    info!(
        outcome = ?result.outcome,
        failed = result.failed_nodes.len(),
        elapsed = ?result.duration,
        "build finished"
    );
    if !result.outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn render(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted {
            build_id,
            total_checkpoints,
            parallelism,
        } => {
            println!();
            output::header(&format!(
                "Build '{}' ({} checkpoints, {} slots)",
                build_id, total_checkpoints, parallelism
            ));
        }

        ExecutionEvent::CheckpointStarted { index, label, width } => {
            output::checkpoint_header(*index, label, *width);
        }

        ExecutionEvent::NodeStatusChanged {
            node,
            status,
            message,
        } => match status {
            NodeStatus::Succeeded => output::check(&format!("{} succeeded", node)),
            NodeStatus::Failed => {
                output::failure(&format!("{} failed", node));
                if let Some(message) = message {
                    for line in message.lines() {
                        output::node_error(node, line);
                    }
                }
            }
            _ => output::dim(&format!("    {} {}", node, status)),
        },

        ExecutionEvent::CommandStarted {
            node,
            description,
            command,
        } => {
            output::dim(&format!("    START:{}-{}", node, description));
            output::dim(&format!("    $ {}", command));
        }

        ExecutionEvent::NodeOutput {
            node,
            line,
            is_error,
        } => {
            if *is_error {
                output::node_error(node, line);
            } else {
                output::node_output(node, line);
            }
        }

        ExecutionEvent::CommandCompleted {
            node,
            description,
            exit_code,
            duration,
            ..
        } => {
            output::dim(&format!(
                "    END:{}-{} (exit code: {:?}, {:.2}s)",
                node,
                description,
                exit_code,
                duration.as_secs_f64()
            ));
        }

        ExecutionEvent::HaltWaiting { checkpoint } => {
            output::warning(&format!(
                "Build failed at '{}', waiting for the coordinator",
                checkpoint
            ));
        }

        ExecutionEvent::HaltReceived { command } => match command {
            HaltCommand::Halt => output::warning("Halt received, stopping build"),
            HaltCommand::Continue => output::info("Continue received, resuming build"),
        },

        ExecutionEvent::RunCompleted { outcome, duration } => {
            println!();
            let secs = duration.as_secs_f64();
            match outcome {
                RunOutcome::Succeeded => {
                    output::success(&format!("Build succeeded in {:.2}s", secs))
                }
                RunOutcome::Failed { at } => {
                    output::failure(&format!("Build failed at '{}' after {:.2}s", at, secs))
                }
                RunOutcome::Halted { at } => output::error(&format!(
                    "Build halted after '{}' failed ({:.2}s)",
                    at, secs
                )),
            }
        }
    }
}
