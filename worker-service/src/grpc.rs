// gRPC Bindings
// Generated protocol types, domain conversions, and the coordinator client

use crate::coordinator::{Coordinator, CoordinatorError, ProjectInfo, StatusUpdate};
use crate::execution::halt::HaltCommand;
use crate::lifecycle::NodeStatus;

use proto::shift_client::ShiftClient;
use tonic::transport::Channel;

pub mod proto {
    tonic::include_proto!("shift");
}

impl From<NodeStatus> for proto::BuildStatus {
    fn from(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Pending => proto::BuildStatus::Pending,
            NodeStatus::Waiting => proto::BuildStatus::Waiting,
            NodeStatus::Running => proto::BuildStatus::Running,
            NodeStatus::Succeeded => proto::BuildStatus::Succeeded,
            NodeStatus::Failed => proto::BuildStatus::Failed,
        }
    }
}

impl From<proto::BuildStatus> for NodeStatus {
    fn from(status: proto::BuildStatus) -> Self {
        match status {
            proto::BuildStatus::Pending => NodeStatus::Pending,
            proto::BuildStatus::Waiting => NodeStatus::Waiting,
            proto::BuildStatus::Running => NodeStatus::Running,
            proto::BuildStatus::Succeeded => NodeStatus::Succeeded,
            proto::BuildStatus::Failed => NodeStatus::Failed,
        }
    }
}

impl From<HaltCommand> for proto::HaltAction {
    fn from(command: HaltCommand) -> Self {
        match command {
            HaltCommand::Halt => proto::HaltAction::Halt,
            HaltCommand::Continue => proto::HaltAction::Continue,
        }
    }
}

impl From<proto::HaltAction> for HaltCommand {
    fn from(action: proto::HaltAction) -> Self {
        match action {
            proto::HaltAction::Halt => HaltCommand::Halt,
            proto::HaltAction::Continue => HaltCommand::Continue,
        }
    }
}

impl From<proto::GetProjectRes> for ProjectInfo {
    fn from(p: proto::GetProjectRes) -> Self {
        ProjectInfo {
            id: p.id,
            name: p.name,
            team_id: p.team_id,
            language: p.language,
            clone_url: p.clone_url,
            branch: p.branch,
            source: p.source,
        }
    }
}

impl From<ProjectInfo> for proto::GetProjectRes {
    fn from(p: ProjectInfo) -> Self {
        proto::GetProjectRes {
            id: p.id,
            name: p.name,
            team_id: p.team_id,
            language: p.language,
            clone_url: p.clone_url,
            branch: p.branch,
            source: p.source,
        }
    }
}

impl From<StatusUpdate> for proto::UpdateBuildStatusReq {
    fn from(update: StatusUpdate) -> Self {
        proto::UpdateBuildStatusReq {
            build_id: update.build_id,
            graph: update.graph,
            status: i32::from(proto::BuildStatus::from(update.status)),
            checkpoint: update.checkpoint,
        }
    }
}

impl From<proto::UpdateBuildStatusReq> for StatusUpdate {
    fn from(req: proto::UpdateBuildStatusReq) -> Self {
        StatusUpdate {
            status: NodeStatus::from(req.status()),
            build_id: req.build_id,
            graph: req.graph,
            checkpoint: req.checkpoint,
        }
    }
}

/// Coordinator reached over gRPC
#[derive(Debug, Clone)]
pub struct GrpcCoordinator {
    client: ShiftClient<Channel>,
}

impl GrpcCoordinator {
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self, CoordinatorError> {
        let endpoint = endpoint.into();
        let client = ShiftClient::connect(endpoint.clone())
            .await
            .map_err(|e| CoordinatorError::Connect {
                endpoint,
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: ShiftClient::new(channel),
        }
    }
}

#[async_trait::async_trait]
impl Coordinator for GrpcCoordinator {
    async fn get_project(&self, build_id: &str) -> Result<ProjectInfo, CoordinatorError> {
        let mut client = self.client.clone();
        let response = client
            .get_project(proto::GetProjectReq {
                build_id: build_id.to_string(),
            })
            .await?;
        Ok(response.into_inner().into())
    }

    async fn update_build_status(&self, update: StatusUpdate) -> Result<(), CoordinatorError> {
        let mut client = self.client.clone();
        client
            .update_build_status(proto::UpdateBuildStatusReq::from(update))
            .await?;
        Ok(())
    }
}
