//! Terminal workflow status reporting.
//!
//! [`WorkflowReporter::report`] takes `self` by value, so an invocation that
//! owns one reporter can emit at most one terminal status.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{StepStatus, WorkflowNotifier};
use crate::error::DecryptError;
use crate::request::WorkflowContext;

/// Result of a report attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Callback delivered
    Delivered,
    /// Context incomplete, nothing sent
    Skipped,
    /// Delivery attempted and failed (logged)
    Failed,
}

/// One-shot workflow status reporter
pub struct WorkflowReporter {
    notifier: Arc<dyn WorkflowNotifier>,
    context: WorkflowContext,
}

impl WorkflowReporter {
    pub fn new(notifier: Arc<dyn WorkflowNotifier>, context: WorkflowContext) -> Self {
        Self { notifier, context }
    }

    /// Whether a report would actually be sent
    pub fn is_active(&self) -> bool {
        self.context.target().is_some()
    }

    /// Send the terminal status. Delivery failures are logged, never returned.
    pub async fn report(self, status: StepStatus) -> ReportOutcome {
        let Some(target) = self.context.target() else {
            if !self.context.is_empty() {
                warn!(
                    status = %status,
                    "Workflow context incomplete, skipping status callback"
                );
            } else {
                debug!(status = %status, "No workflow context, skipping status callback");
            }
            return ReportOutcome::Skipped;
        };

        match self.notifier.send_step_state(target, status).await {
            Ok(()) => {
                info!(
                    workflow_id = target.workflow_id,
                    execution_id = target.execution_id,
                    status = %status,
                    "Sent workflow step status"
                );
                ReportOutcome::Delivered
            }
            Err(e) => {
                let error = DecryptError::CallbackFailed(e.to_string());
                warn!(
                    workflow_id = target.workflow_id,
                    execution_id = target.execution_id,
                    status = %status,
                    stage = %error.stage(),
                    error = %error,
                    "Workflow callback failed"
                );
                ReportOutcome::Failed
            }
        }
    }
}
