/*!
 * Transfer request data model shared by the router and the executor
 */

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DecryptError, Result};

/// Environment keys understood by the delegated executor
pub mod env_keys {
    pub const SOURCE_BUCKET: &str = "SOURCE_BUCKET";
    pub const SOURCE_KEY: &str = "SOURCE_KEY";
    pub const DESTINATION_BUCKET: &str = "DESTINATION_BUCKET";
    pub const DESTINATION_KEY: &str = "DESTINATION_KEY";
    pub const TRANSFER_SERVER_ID: &str = "TRANSFER_SERVER_ID";
    pub const WORKFLOW_ID: &str = "WORKFLOW_ID";
    pub const EXECUTION_ID: &str = "EXECUTION_ID";
    pub const WORKFLOW_TOKEN: &str = "WORKFLOW_TOKEN";
}

/// Bucket + key of one object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Last path segment of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Correlation data for workflow status callbacks
///
/// Each part is optional because the triggering event may carry only some of
/// them; callbacks are only possible when all three are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub workflow_id: Option<String>,
    pub execution_id: Option<String>,
    pub token: Option<String>,
}

/// Fully-specified callback target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackTarget<'a> {
    pub workflow_id: &'a str,
    pub execution_id: &'a str,
    pub token: &'a str,
}

impl WorkflowContext {
    pub fn new(
        workflow_id: Option<String>,
        execution_id: Option<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            workflow_id: non_empty(workflow_id),
            execution_id: non_empty(execution_id),
            token: non_empty(token),
        }
    }

    /// The complete triple, or `None` when any part is missing
    pub fn target(&self) -> Option<CallbackTarget<'_>> {
        Some(CallbackTarget {
            workflow_id: self.workflow_id.as_deref()?,
            execution_id: self.execution_id.as_deref()?,
            token: self.token.as_deref()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.workflow_id.is_none() && self.execution_id.is_none() && self.token.is_none()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// One unit of work for the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source: ObjectLocation,
    pub destination: ObjectLocation,
    pub server_id: String,
    #[serde(default)]
    pub workflow: WorkflowContext,
}

impl TransferRequest {
    /// Encode the request as the executor's environment.
    ///
    /// Workflow parts are only emitted when present.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            (env_keys::SOURCE_BUCKET, self.source.bucket.clone()),
            (env_keys::SOURCE_KEY, self.source.key.clone()),
            (env_keys::DESTINATION_BUCKET, self.destination.bucket.clone()),
            (env_keys::DESTINATION_KEY, self.destination.key.clone()),
            (env_keys::TRANSFER_SERVER_ID, self.server_id.clone()),
        ];

        let optional = [
            (env_keys::WORKFLOW_ID, &self.workflow.workflow_id),
            (env_keys::EXECUTION_ID, &self.workflow.execution_id),
            (env_keys::WORKFLOW_TOKEN, &self.workflow.token),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                env.push((name, value.clone()));
            }
        }

        env.into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Decode a request from environment-style lookups
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| name.to_string())
        };

        let source_bucket = required(env_keys::SOURCE_BUCKET);
        let source_key = required(env_keys::SOURCE_KEY);
        let destination_bucket = required(env_keys::DESTINATION_BUCKET);
        let destination_key = required(env_keys::DESTINATION_KEY);
        let server_id = required(env_keys::TRANSFER_SERVER_ID);

        match (
            source_bucket,
            source_key,
            destination_bucket,
            destination_key,
            server_id,
        ) {
            (Ok(sb), Ok(sk), Ok(db), Ok(dk), Ok(sid)) => Ok(Self {
                source: ObjectLocation::new(sb, sk),
                destination: ObjectLocation::new(db, dk),
                server_id: sid,
                workflow: WorkflowContext::new(
                    lookup(env_keys::WORKFLOW_ID),
                    lookup(env_keys::EXECUTION_ID),
                    lookup(env_keys::WORKFLOW_TOKEN),
                ),
            }),
            (sb, sk, db, dk, sid) => {
                let missing: Vec<String> = [sb, sk, db, dk, sid]
                    .into_iter()
                    .filter_map(|r| r.err())
                    .collect();
                Err(DecryptError::Config(format!(
                    "Missing required environment variables: {}",
                    missing.join(", ")
                )))
            }
        }
    }
}
