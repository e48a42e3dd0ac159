//! AWS-backed collaborators
//!
//! - [`S3ObjectStore`]: S3 head/get/put with multipart upload for large objects
//! - [`SecretsManagerKeyStore`]: per-server PGP key secrets
//! - [`EcsTaskLauncher`]: starts the executor as a Fargate task
//! - [`TransferWorkflowNotifier`]: Transfer Family workflow step callbacks
//!
//! All clients are built from one shared SDK configuration. Retries and
//! timeouts live here, in the SDK, never in the pipeline.

pub mod ecs;
pub mod s3;
pub mod secrets;
pub mod transfer;

pub use ecs::EcsTaskLauncher;
pub use s3::S3ObjectStore;
pub use secrets::SecretsManagerKeyStore;
pub use transfer::TransferWorkflowNotifier;

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use std::time::Duration;
use tracing::debug;

/// Attempts per SDK call, first try included
pub const MAX_ATTEMPTS: u32 = 3;

/// Connection establishment timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Socket read timeout; large objects stream for a long time
pub const READ_TIMEOUT: Duration = Duration::from_secs(600);

/// Load the shared SDK configuration from the default provider chain
/// (`AWS_REGION`, credentials, `AWS_ENDPOINT_URL`, ...).
pub async fn load_shared_config() -> SdkConfig {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::standard().with_max_attempts(MAX_ATTEMPTS))
        .timeout_config(
            TimeoutConfig::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .read_timeout(READ_TIMEOUT)
                .build(),
        )
        .load()
        .await;

    debug!(
        region = config.region().map(|r| r.as_ref()).unwrap_or("unset"),
        "Loaded AWS configuration"
    );
    config
}
