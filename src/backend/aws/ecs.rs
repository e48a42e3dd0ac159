//! ECS/Fargate task launcher
//!
//! Starts the executor container as a Fargate task with awsvpc networking
//! and the transfer request passed as environment overrides. The router
//! does not wait for the task.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, TaskOverride,
};
use aws_sdk_ecs::Client;
use tracing::{info, warn};

use crate::backend::{DelegationHandle, ServiceError, ServiceResult, TaskLauncher};
use crate::config::DelegationConfig;

#[derive(Debug, Clone)]
pub struct EcsTaskLauncher {
    client: Client,
    config: DelegationConfig,
}

impl EcsTaskLauncher {
    pub fn new(client: Client, config: DelegationConfig) -> Self {
        Self { client, config }
    }

    pub fn from_config(sdk_config: &SdkConfig, config: DelegationConfig) -> Self {
        Self::new(Client::new(sdk_config), config)
    }
}

fn network_configuration(config: &DelegationConfig) -> ServiceResult<NetworkConfiguration> {
    let assign_public_ip = if config.assign_public_ip {
        AssignPublicIp::Enabled
    } else {
        AssignPublicIp::Disabled
    };

    let vpc = AwsVpcConfiguration::builder()
        .set_subnets(Some(config.subnets.clone()))
        .security_groups(config.security_group.clone())
        .assign_public_ip(assign_public_ip)
        .build()
        .map_err(|e| ServiceError::Service {
            code: "InvalidParameter".to_string(),
            message: format!("Invalid network configuration: {}", e),
        })?;

    Ok(NetworkConfiguration::builder()
        .awsvpc_configuration(vpc)
        .build())
}

fn task_overrides(container_name: &str, environment: &[(String, String)]) -> TaskOverride {
    let environment = environment
        .iter()
        .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
        .collect();

    TaskOverride::builder()
        .container_overrides(
            ContainerOverride::builder()
                .name(container_name)
                .set_environment(Some(environment))
                .build(),
        )
        .build()
}

#[async_trait]
impl TaskLauncher for EcsTaskLauncher {
    async fn launch(&self, environment: &[(String, String)]) -> ServiceResult<DelegationHandle> {
        info!(
            cluster = %self.config.cluster,
            task_definition = %self.config.task_definition,
            container = %self.config.container_name,
            "Starting Fargate task"
        );

        let output = self
            .client
            .run_task()
            .cluster(&self.config.cluster)
            .task_definition(&self.config.task_definition)
            .launch_type(LaunchType::Fargate)
            .network_configuration(network_configuration(&self.config)?)
            .overrides(task_overrides(&self.config.container_name, environment))
            .send()
            .await?;

        let reasons: Vec<String> = output
            .failures()
            .iter()
            .map(|f| {
                format!(
                    "{}: {}",
                    f.arn().unwrap_or("unknown"),
                    f.reason().unwrap_or("no reason given")
                )
            })
            .collect();
        for reason in &reasons {
            warn!(failure = %reason, "Task launch reported a failure");
        }

        let task = output.tasks().first().ok_or_else(|| {
            ServiceError::InvalidResponse(if reasons.is_empty() {
                "No tasks started".to_string()
            } else {
                format!("No tasks started: {}", reasons.join("; "))
            })
        })?;

        let task_arn = task
            .task_arn()
            .ok_or_else(|| ServiceError::InvalidResponse("Started task has no ARN".to_string()))?
            .to_string();

        info!(task_arn = %task_arn, "Fargate task started");
        Ok(DelegationHandle {
            task_arn,
            cluster_arn: task.cluster_arn().map(String::from),
        })
    }
}
