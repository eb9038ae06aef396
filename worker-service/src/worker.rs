// Build Worker
// Runs one build: fetch the project, prepare the workspace, walk the graph

use crate::cache::{CachePersister, DirectoryCache, NoopCache};
use crate::config::WorkerConfig;
use crate::coordinator::Coordinator;
use crate::error::{ServiceError, ServiceResult};
use crate::execution::{CheckpointWalker, HaltReceiver, ProgressSender, WalkResult};
use crate::graph::Graph;
use crate::grpc::GrpcCoordinator;
use crate::reporter::StatusReporter;
use crate::runners::{ExecutorRegistry, ShellExecutor, StepExecutor};
use crate::utils::prepare_working_dir;

use std::sync::Arc;
use tracing::{error, info, instrument};

pub struct BuildWorker {
    config: WorkerConfig,
    coordinator: Arc<dyn Coordinator>,
    plugins: Vec<(String, Arc<dyn StepExecutor>)>,
    event_tx: Option<ProgressSender>,
}

impl BuildWorker {
    pub fn new(config: WorkerConfig, coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            config,
            coordinator,
            plugins: Vec::new(),
            event_tx: None,
        }
    }

    /// Validate `config` and connect to its coordinator over gRPC
    pub async fn connect(config: WorkerConfig) -> ServiceResult<Self> {
        config.validate()?;
        let coordinator = GrpcCoordinator::connect(config.coordinator_endpoint()).await?;
        Ok(Self::new(config, Arc::new(coordinator)))
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Register an executor for plugin nodes named `name`
    pub fn with_plugin(mut self, name: impl Into<String>, executor: Arc<dyn StepExecutor>) -> Self {
        self.plugins.push((name.into(), executor));
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    #[instrument(name = "build", skip_all, fields(build_id = %self.config.build_id))]
    pub async fn run(self, graph: Arc<Graph>, halt_rx: HaltReceiver) -> ServiceResult<WalkResult> {
        let project = self
            .coordinator
            .get_project(&self.config.build_id)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to fetch project");
                ServiceError::Project(e)
            })?;
        info!(
            project = %project.name,
            branch = %project.branch,
            language = %project.language,
            "fetched project"
        );

        let work_dir = prepare_working_dir(&self.config.work_dir)?;
        info!(work_dir = %work_dir.display(), "prepared working directory");

        let shell = ShellExecutor::new(self.config.shell_config(work_dir.clone()));
        let registry = self
            .plugins
            .into_iter()
            .fold(ExecutorRegistry::new(shell), |registry, (name, executor)| {
                registry.with_plugin(name, executor)
            });

        let sources = self.config.cache_sources(&work_dir);
        let cache: Arc<dyn CachePersister> = if sources.is_empty() {
            Arc::new(NoopCache)
        } else {
            Arc::new(DirectoryCache::new(self.config.storage_dir.clone(), sources))
        };

        let reporter = StatusReporter::new(self.config.build_id.clone())
            .with_coordinator(self.coordinator)
            .with_cache(cache);

        let mut walker = CheckpointWalker::new(graph, Arc::new(registry), Arc::new(reporter), halt_rx)
            .with_config(self.config.walker_config());
        if let Some(tx) = self.event_tx {
            walker = walker.with_progress(tx);
        }

        Ok(walker.walk().await?)
    }
}
