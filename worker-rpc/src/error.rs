use std::fmt;

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug)]
pub enum RpcError {
    BindError(std::io::Error),
    TransportError(tonic::transport::Error),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::BindError(err) => write!(f, "Failed to bind control server: {}", err),
            RpcError::TransportError(err) => write!(f, "Transport error: {}", err),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::BindError(err) => Some(err),
            RpcError::TransportError(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::BindError(err)
    }
}

impl From<tonic::transport::Error> for RpcError {
    fn from(err: tonic::transport::Error) -> Self {
        RpcError::TransportError(err)
    }
}
