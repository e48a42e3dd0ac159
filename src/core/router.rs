//! Router: decides from object size alone whether a transfer is delegated.
//!
//! Files at or above the threshold are handed to an independent executor
//! task; the router returns as soon as the task has started and leaves
//! status reporting to it. Smaller files have no inline path and are
//! rejected, with a `FAILURE` callback when the event carries a workflow.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::{
    DelegationHandle, ObjectStore, StepStatus, TaskLauncher, WorkflowNotifier,
};
use crate::config::{RouterConfig, DEFAULT_THRESHOLD_BYTES};
use crate::core::paths::{destination_key, parse_source_path};
use crate::core::report::WorkflowReporter;
use crate::error::{DecryptError, Result};
use crate::request::{ObjectLocation, TransferRequest, WorkflowContext};

/// Routing decision for one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Start an executor task outside the router's resource limits
    Delegate,

    /// Below the threshold; no inline execution path exists
    RejectBelowThreshold,
}

/// Size-based routing decision
#[derive(Debug, Clone)]
pub struct SizeRouter {
    /// Size threshold in bytes (files at or above this are delegated)
    threshold: u64,
}

impl SizeRouter {
    /// # Example
    ///
    /// ```
    /// use sftp_decrypt::core::router::{Route, SizeRouter};
    ///
    /// let router = SizeRouter::new(1024);
    /// assert_eq!(router.route(1023), Route::RejectBelowThreshold);
    /// assert_eq!(router.route(1024), Route::Delegate);
    /// ```
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    pub fn route(&self, file_size: u64) -> Route {
        if file_size >= self.threshold {
            Route::Delegate
        } else {
            Route::RejectBelowThreshold
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl Default for SizeRouter {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_BYTES)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetails {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    #[serde(default)]
    pub execution_details: Option<ExecutionDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDetails {
    #[serde(default)]
    pub server_id: Option<String>,
}

/// Workflow step event that triggers the router
///
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    #[serde(default)]
    pub file_location: Option<ObjectLocation>,
    #[serde(default)]
    pub initial_file_location: Option<ObjectLocation>,
    #[serde(default)]
    pub service_metadata: Option<ServiceMetadata>,
    #[serde(default)]
    pub transfer_details: Option<TransferDetails>,
    #[serde(default)]
    pub token: Option<String>,
}

impl TransferEvent {
    /// `fileLocation`, falling back to `initialFileLocation`
    pub fn location(&self) -> Option<&ObjectLocation> {
        self.file_location
            .as_ref()
            .or(self.initial_file_location.as_ref())
    }

    pub fn workflow(&self) -> WorkflowContext {
        let details = self
            .service_metadata
            .as_ref()
            .and_then(|m| m.execution_details.clone())
            .unwrap_or_default();
        WorkflowContext::new(details.workflow_id, details.execution_id, self.token.clone())
    }

    pub fn server_id(&self) -> Option<&str> {
        self.transfer_details
            .as_ref()
            .and_then(|d| d.server_id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }
}

/// HTTP-style response returned to the router's caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl RouterResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

enum Dispatch {
    Delegated {
        handle: DelegationHandle,
        size: u64,
    },
    Rejected {
        size: u64,
    },
}

fn megabytes(size: u64) -> String {
    format!("{:.2}", size as f64 / 1024.0 / 1024.0)
}

fn failure_response(error: &DecryptError) -> RouterResponse {
    RouterResponse {
        status_code: error.status_code(),
        body: json!({
            "error": "Orchestrator failed",
            "message": error.to_string(),
        }),
    }
}

/// Answer an event when no [`Router`] could be configured.
///
/// The event's workflow still receives its `FAILURE`.
pub async fn reject_unconfigured(
    notifier: Arc<dyn WorkflowNotifier>,
    event: &TransferEvent,
    error: &DecryptError,
) -> RouterResponse {
    error!(stage = %error.stage(), error = %error, "Router configuration invalid");
    WorkflowReporter::new(notifier, event.workflow())
        .report(StepStatus::Failure)
        .await;
    failure_response(error)
}

/// Event-driven router bound to its collaborators
pub struct Router {
    store: Arc<dyn ObjectStore>,
    launcher: Arc<dyn TaskLauncher>,
    notifier: Arc<dyn WorkflowNotifier>,
    config: RouterConfig,
    sizer: SizeRouter,
}

impl Router {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        launcher: Arc<dyn TaskLauncher>,
        notifier: Arc<dyn WorkflowNotifier>,
        config: RouterConfig,
    ) -> Self {
        let sizer = SizeRouter::new(config.threshold_bytes);
        Self {
            store,
            launcher,
            notifier,
            config,
            sizer,
        }
    }

    /// Route one event.
    ///
    /// Never fails: errors are turned into a response, and a `FAILURE`
    /// callback is attempted for every outcome other than delegation.
    pub async fn handle(&self, event: &TransferEvent) -> RouterResponse {
        let reporter = WorkflowReporter::new(self.notifier.clone(), event.workflow());

        match self.dispatch(event).await {
            Ok(Dispatch::Delegated { handle, size }) => {
                info!(
                    task_arn = %handle.task_arn,
                    cluster_arn = handle.cluster_arn.as_deref().unwrap_or(""),
                    "Delegated task started; it reports the workflow status"
                );
                RouterResponse {
                    status_code: 202,
                    body: json!({
                        "message": "Decryption started in Fargate",
                        "taskArn": handle.task_arn,
                        "fileSize": size,
                        "fileSizeMB": megabytes(size),
                    }),
                }
            }
            Ok(Dispatch::Rejected { size }) => {
                warn!(
                    bytes = size,
                    threshold = self.sizer.threshold(),
                    "File below delegation threshold, inline processing not implemented"
                );
                reporter.report(StepStatus::Failure).await;
                RouterResponse {
                    status_code: 400,
                    body: json!({
                        "message": "File below Fargate threshold, inline processing not implemented",
                        "fileSize": size,
                        "fileSizeMB": megabytes(size),
                        "threshold": self.sizer.threshold(),
                    }),
                }
            }
            Err(e) => {
                error!(stage = %e.stage(), error = %e, "Router failed");
                reporter.report(StepStatus::Failure).await;
                failure_response(&e)
            }
        }
    }

    async fn dispatch(&self, event: &TransferEvent) -> Result<Dispatch> {
        let source = event
            .location()
            .ok_or(DecryptError::MissingFileLocation)?
            .clone();
        info!(bucket = %source.bucket, key = %source.key, "Processing file");

        let parsed = parse_source_path(&source.key)?;
        let destination = ObjectLocation::new(
            self.config.destination_bucket.clone(),
            destination_key(&parsed.user, &parsed.rest),
        );

        let size = self
            .store
            .object_size(&source)
            .await
            .map_err(|e| DecryptError::SizeLookupFailed {
                location: source.clone(),
                source: e,
            })?;
        info!(bytes = size, "File size: {} MB", megabytes(size));

        let server_id = event
            .server_id()
            .map(String::from)
            .or_else(|| self.config.server_id.clone())
            .ok_or_else(|| {
                DecryptError::Config(
                    "Server ID not found in event or environment variables".to_string(),
                )
            })?;

        match self.sizer.route(size) {
            Route::Delegate => {
                let request = TransferRequest {
                    source,
                    destination,
                    server_id,
                    workflow: event.workflow(),
                };
                info!(
                    destination = %request.destination,
                    threshold = self.sizer.threshold(),
                    "File at or above threshold, starting delegated task"
                );

                let handle = self
                    .launcher
                    .launch(&request.to_env())
                    .await
                    .map_err(|e| DecryptError::DelegationFailed(e.to_string()))?;
                Ok(Dispatch::Delegated { handle, size })
            }
            Route::RejectBelowThreshold => Ok(Dispatch::Rejected { size }),
        }
    }
}
