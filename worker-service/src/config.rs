// Worker Configuration
// Settings for one build run, normally filled from the environment by the CLI

use crate::execution::walker::{default_parallelism, WalkerConfig};
use crate::runners::ShellConfig;
use crate::utils::{default_storage_dir, expand_home};

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_COORDINATOR_PORT: u16 = 9101;
pub const DEFAULT_WORKER_PORT: u16 = 9200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub coordinator_host: String,
    pub coordinator_port: u16,
    pub build_id: String,
    pub team_id: String,
    /// Directory build commands run in
    pub work_dir: PathBuf,
    /// Root for worker storage, including saved caches
    pub storage_dir: PathBuf,
    /// Port the halt control server listens on
    pub worker_port: u16,
    /// Fan-out pool size; defaults to one less than the CPU count
    pub parallelism: Option<usize>,
    /// How long to wait for a halt command after a failure (None = forever)
    pub halt_timeout: Option<Duration>,
    /// Per-command timeout (None = no timeout)
    pub step_timeout: Option<Duration>,
    /// Directories saved to the cache when the build finishes
    pub cache_dirs: Vec<PathBuf>,
    /// Extra environment for build commands
    pub env: HashMap<String, String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let storage_dir = default_storage_dir();
        Self {
            coordinator_host: "127.0.0.1".to_string(),
            coordinator_port: DEFAULT_COORDINATOR_PORT,
            build_id: String::new(),
            team_id: String::new(),
            work_dir: storage_dir.join("workspace"),
            storage_dir,
            worker_port: DEFAULT_WORKER_PORT,
            parallelism: None,
            halt_timeout: None,
            step_timeout: None,
            cache_dirs: Vec::new(),
            env: HashMap::new(),
        }
    }
}

impl WorkerConfig {
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            ..Self::default()
        }
    }

    pub fn coordinator_endpoint(&self) -> String {
        format!("http://{}:{}", self.coordinator_host, self.coordinator_port)
    }

    /// Address the control server binds to
    pub fn worker_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.worker_port))
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
            .map(|p| p.max(1))
            .unwrap_or_else(default_parallelism)
    }

    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            parallelism: self.parallelism(),
            halt_timeout: self.halt_timeout,
        }
    }

    pub fn shell_config(&self, working_dir: PathBuf) -> ShellConfig {
        let mut env = self.env.clone();
        env.insert("SHIFT_BUILDID".to_string(), self.build_id.clone());
        if !self.team_id.is_empty() {
            env.insert("SHIFT_TEAMID".to_string(), self.team_id.clone());
        }
        ShellConfig {
            working_dir: Some(working_dir),
            env,
            timeout: self.step_timeout,
        }
    }

    /// Cache sources, relative ones resolved against `work_dir`
    pub fn cache_sources(&self, work_dir: &std::path::Path) -> Vec<PathBuf> {
        self.cache_dirs
            .iter()
            .map(|dir| {
                let dir = expand_home(dir);
                if dir.is_absolute() {
                    dir
                } else {
                    work_dir.join(dir)
                }
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_id.trim().is_empty() {
            return Err(ConfigError::Missing("build id"));
        }
        if self.coordinator_host.trim().is_empty() {
            return Err(ConfigError::Missing("coordinator host"));
        }
        if self.coordinator_port == 0 {
            return Err(ConfigError::Invalid {
                field: "coordinator port",
                reason: "port must be non-zero".to_string(),
            });
        }
        if self.parallelism == Some(0) {
            return Err(ConfigError::Invalid {
                field: "parallelism",
                reason: "at least one execution slot is required".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::new("b-1");
        assert_eq!(config.coordinator_endpoint(), "http://127.0.0.1:9101");
        assert_eq!(config.worker_addr().port(), DEFAULT_WORKER_PORT);
        assert!(config.parallelism() >= 1);
        assert!(config.halt_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            WorkerConfig::default().validate(),
            Err(ConfigError::Missing("build id"))
        );

        let config = WorkerConfig {
            parallelism: Some(0),
            ..WorkerConfig::new("b-2")
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "parallelism", .. })
        ));
    }

    #[test]
    fn test_shell_config_exports_build_id() {
        let config = WorkerConfig {
            team_id: "team-9".to_string(),
            step_timeout: Some(Duration::from_secs(30)),
            ..WorkerConfig::new("b-3")
        };
        let shell = config.shell_config(PathBuf::from("/tmp/work"));

        assert_eq!(shell.env.get("SHIFT_BUILDID").map(String::as_str), Some("b-3"));
        assert_eq!(shell.env.get("SHIFT_TEAMID").map(String::as_str), Some("team-9"));
        assert_eq!(shell.timeout, Some(Duration::from_secs(30)));
        assert_eq!(shell.working_dir.as_deref(), Some(Path::new("/tmp/work")));
    }

    #[test]
    fn test_cache_sources_resolve_relative() {
        let config = WorkerConfig {
            cache_dirs: vec![PathBuf::from("target"), PathBuf::from("/opt/deps")],
            ..WorkerConfig::new("b-4")
        };
        let sources = config.cache_sources(Path::new("/work"));
        assert_eq!(
            sources,
            vec![PathBuf::from("/work/target"), PathBuf::from("/opt/deps")]
        );
    }
}
