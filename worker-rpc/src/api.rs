use crate::error::RpcResult;
use crate::handlers::ControlHandler;

use worker_service::grpc::proto::worker_server::WorkerServer;
use worker_service::HaltSender;

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;

/// gRPC control server exposing the halt endpoint
pub struct RpcServer {
    control_handler: ControlHandler,
}

impl RpcServer {
    pub fn new(build_id: impl Into<String>, halt_tx: HaltSender) -> Self {
        Self {
            control_handler: ControlHandler::new(build_id, halt_tx),
        }
    }

    pub fn control_handler(&self) -> &ControlHandler {
        &self.control_handler
    }

    /// Bind `addr` and serve until `shutdown` is cancelled
    pub async fn serve(self, addr: SocketAddr, shutdown: CancellationToken) -> RpcResult<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> RpcResult<()> {
        let addr = listener.local_addr()?;
        info!(%addr, build_id = %self.control_handler.build_id(), "control server listening");

        Server::builder()
            .add_service(WorkerServer::new(self.control_handler))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                shutdown.cancelled().await
            })
            .await?;

        info!("control server stopped");
        Ok(())
    }
}
