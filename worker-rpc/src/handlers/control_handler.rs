use worker_service::grpc::proto::{worker_server::Worker, HaltReq, HaltRes};
use worker_service::{HaltCommand, HaltSender};

use tonic::{Request, Response, Status};
use tracing::info;

/// Receives halt commands for the build running on this worker
#[derive(Debug, Clone)]
pub struct ControlHandler {
    build_id: String,
    halt_tx: HaltSender,
}

impl ControlHandler {
    pub fn new(build_id: impl Into<String>, halt_tx: HaltSender) -> Self {
        Self {
            build_id: build_id.into(),
            halt_tx,
        }
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// Forward a command to the walker
    pub async fn dispatch(&self, build_id: &str, command: HaltCommand) -> Result<(), Status> {
        if build_id != self.build_id {
            return Err(Status::invalid_argument(format!(
                "build '{}' is not running on this worker",
                build_id
            )));
        }
        self.halt_tx
            .send(command)
            .await
            .map_err(|_| Status::unavailable("build is no longer accepting halt commands"))?;
        info!(build_id, %command, "halt command accepted");
        Ok(())
    }
}

#[tonic::async_trait]
impl Worker for ControlHandler {
    async fn halt(&self, request: Request<HaltReq>) -> Result<Response<HaltRes>, Status> {
        let req = request.into_inner();
        let command = HaltCommand::from(req.action());
        self.dispatch(&req.build_id, command).await?;
        Ok(Response::new(HaltRes { accepted: true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worker_service::halt_channel;

    #[tokio::test]
    async fn test_dispatch_forwards_command() {
        let (tx, mut rx) = halt_channel();
        let handler = ControlHandler::new("b-1", tx);

        handler.dispatch("b-1", HaltCommand::Continue).await.unwrap();
        assert_eq!(rx.recv().await, Some(HaltCommand::Continue));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_other_build() {
        let (tx, mut rx) = halt_channel();
        let handler = ControlHandler::new("b-1", tx);

        let status = handler.dispatch("b-2", HaltCommand::Halt).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_after_walker_finished() {
        let (tx, rx) = halt_channel();
        drop(rx);
        let handler = ControlHandler::new("b-1", tx);

        let status = handler.dispatch("b-1", HaltCommand::Halt).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }
}
