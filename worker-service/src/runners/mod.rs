// Runners Module
// Step executors that perform the work behind a node

pub mod shell;

pub use shell::{ShellConfig, ShellExecutor, ShellOutput};

use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::graph::WorkItem;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a step did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct StepFailure {
    pub reason: String,
    /// Captured error output of the failing command
    pub diagnostic: String,
}

impl StepFailure {
    pub fn new(reason: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            diagnostic: diagnostic.into(),
        }
    }

    /// Message recorded on the failed node: the diagnostic when there is one
    pub fn message(&self) -> &str {
        if self.diagnostic.trim().is_empty() {
            &self.reason
        } else {
            &self.diagnostic
        }
    }
}

/// Destination for a node's log output
#[derive(Debug, Clone)]
pub struct LogSink {
    node: String,
    description: String,
    events: Option<ProgressSender>,
}

impl LogSink {
    pub fn new(node: impl Into<String>, description: impl Into<String>, events: Option<ProgressSender>) -> Self {
        Self {
            node: node.into(),
            description: description.into(),
            events,
        }
    }

    /// A sink that discards everything
    pub fn detached(node: impl Into<String>) -> Self {
        Self::new(node, "", None)
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn line(&self, line: &str, is_error: bool) {
        self.events
            .send_event(ExecutionEvent::node_output(&self.node, line, is_error));
    }

    pub fn command_started(&self, command: &str) {
        self.events.send_event(ExecutionEvent::CommandStarted {
            node: self.node.clone(),
            description: self.description.clone(),
            command: command.to_string(),
        });
    }

    pub fn command_completed(&self, command: &str, exit_code: Option<i32>, duration: Duration) {
        self.events.send_event(ExecutionEvent::CommandCompleted {
            node: self.node.clone(),
            description: self.description.clone(),
            command: command.to_string(),
            exit_code,
            duration,
        });
    }
}

/// Trait for anything that can run a node's work item
#[async_trait::async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, item: &WorkItem, sink: &LogSink) -> Result<(), StepFailure>;
}

/// Name of the built-in plugin that runs `params.commands` through the shell
pub const SHELL_PLUGIN: &str = "shell";

/// Built-in plugin wrapping the shell executor
struct ShellPlugin {
    shell: Arc<ShellExecutor>,
}

#[async_trait::async_trait]
impl StepExecutor for ShellPlugin {
    async fn execute(&self, item: &WorkItem, sink: &LogSink) -> Result<(), StepFailure> {
        let WorkItem::Plugin { params, .. } = item else {
            return Err(StepFailure::new("shell plugin received a non-plugin work item", ""));
        };
        let commands: Vec<String> = params
            .get("commands")
            .and_then(|value| value.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .ok_or_else(|| {
                StepFailure::new("plugin 'shell' requires a 'commands' list", "")
            })?;
        self.shell.run_commands(&commands, sink).await
    }
}

/// Dispatches work items to the executor that handles them
pub struct ExecutorRegistry {
    shell: Arc<ShellExecutor>,
    plugins: HashMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new(shell: ShellExecutor) -> Self {
        let shell = Arc::new(shell);
        let mut plugins: HashMap<String, Arc<dyn StepExecutor>> = HashMap::new();
        plugins.insert(
            SHELL_PLUGIN.to_string(),
            Arc::new(ShellPlugin {
                shell: Arc::clone(&shell),
            }),
        );
        Self { shell, plugins }
    }

    /// Register an executor for plugin work items named `name`
    pub fn with_plugin(mut self, name: impl Into<String>, executor: Arc<dyn StepExecutor>) -> Self {
        self.plugins.insert(name.into(), executor);
        self
    }

    pub fn shell(&self) -> &ShellExecutor {
        &self.shell
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new(ShellExecutor::default())
    }
}

#[async_trait::async_trait]
impl StepExecutor for ExecutorRegistry {
    async fn execute(&self, item: &WorkItem, sink: &LogSink) -> Result<(), StepFailure> {
        match item {
            WorkItem::Marker => Ok(()),
            WorkItem::Shell { commands } => self.shell.run_commands(commands, sink).await,
            WorkItem::Plugin { name, .. } => match self.plugins.get(name) {
                Some(executor) => executor.execute(item, sink).await,
                None => Err(StepFailure::new(
                    format!("no executor registered for plugin '{}'", name),
                    "",
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::progress_channel;
    use serde_json::json;

    struct Recording;

    #[async_trait::async_trait]
    impl StepExecutor for Recording {
        async fn execute(&self, _item: &WorkItem, sink: &LogSink) -> Result<(), StepFailure> {
            sink.line("recorded", false);
            Ok(())
        }
    }

    fn plugin(name: &str, params: serde_json::Value) -> WorkItem {
        WorkItem::Plugin {
            name: name.to_string(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_failure_message_prefers_diagnostic() {
        assert_eq!(StepFailure::new("exit 1", "missing file").message(), "missing file");
        assert_eq!(StepFailure::new("exit 1", "  ").message(), "exit 1");
    }

    #[tokio::test]
    async fn test_marker_is_noop() {
        let registry = ExecutorRegistry::default();
        let sink = LogSink::detached("START");
        assert!(registry.execute(&WorkItem::Marker, &sink).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_plugin_fails() {
        let registry = ExecutorRegistry::default();
        let sink = LogSink::detached("deploy");

        let failure = registry
            .execute(&plugin("helm", json!({})), &sink)
            .await
            .unwrap_err();
        assert!(failure.reason.contains("helm"));
    }

    #[tokio::test]
    async fn test_registered_plugin_receives_sink() {
        let registry = ExecutorRegistry::default().with_plugin("notify", Arc::new(Recording));
        assert!(registry.has_plugin("notify"));

        let (tx, mut rx) = progress_channel();
        let sink = LogSink::new("notify", "", Some(tx));
        registry
            .execute(&plugin("notify", json!({})), &sink)
            .await
            .unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            ExecutionEvent::NodeOutput { ref line, .. } if line == "recorded"
        ));
    }

    #[tokio::test]
    async fn test_builtin_shell_plugin() {
        let registry = ExecutorRegistry::default();
        let sink = LogSink::detached("script");

        let ok = registry
            .execute(&plugin(SHELL_PLUGIN, json!({"commands": ["true"]})), &sink)
            .await;
        assert!(ok.is_ok());

        let missing = registry
            .execute(&plugin(SHELL_PLUGIN, json!({})), &sink)
            .await
            .unwrap_err();
        assert!(missing.reason.contains("commands"));
    }
}
