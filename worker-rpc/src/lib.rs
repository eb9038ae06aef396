pub mod api;
pub mod error;
pub mod handlers;

pub use api::RpcServer;
pub use error::{RpcError, RpcResult};
pub use handlers::ControlHandler;

// Re-export types needed by clients
pub use worker_service::grpc::proto::{worker_client::WorkerClient, HaltAction, HaltReq, HaltRes};
pub use worker_service::{HaltCommand, HaltReceiver, HaltSender};
pub use worker_service;
