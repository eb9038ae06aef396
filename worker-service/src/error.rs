// Service Errors
// Top-level error type for running a build

use crate::config::ConfigError;
use crate::coordinator::CoordinatorError;
use crate::execution::WalkError;
use crate::graph::GraphError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("failed to fetch project: {0}")]
    Project(#[source] CoordinatorError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
