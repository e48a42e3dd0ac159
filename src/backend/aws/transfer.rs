//! Transfer Family workflow step callbacks

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_transfer::types::CustomStepStatus;
use aws_sdk_transfer::Client;

use crate::backend::{ServiceResult, StepStatus, WorkflowNotifier};
use crate::request::CallbackTarget;

#[derive(Debug, Clone)]
pub struct TransferWorkflowNotifier {
    client: Client,
}

impl TransferWorkflowNotifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

fn custom_step_status(status: StepStatus) -> CustomStepStatus {
    match status {
        StepStatus::Success => CustomStepStatus::Success,
        StepStatus::Failure => CustomStepStatus::Failure,
    }
}

#[async_trait]
impl WorkflowNotifier for TransferWorkflowNotifier {
    async fn send_step_state(
        &self,
        target: CallbackTarget<'_>,
        status: StepStatus,
    ) -> ServiceResult<()> {
        self.client
            .send_workflow_step_state()
            .workflow_id(target.workflow_id)
            .execution_id(target.execution_id)
            .token(target.token)
            .status(custom_step_status(status))
            .send()
            .await?;
        Ok(())
    }
}
