//! Collaborator backends consumed by the router and the pipeline
//!
//! Every external system the core talks to sits behind a narrow capability
//! trait, constructed once at entry and passed in explicitly:
//!
//! - [`ObjectStore`]: size inquiry, streaming fetch and streaming put
//! - [`KeyStore`]: decryption key material scoped by transfer server
//! - [`TaskLauncher`]: starts the delegated executor without waiting on it
//! - [`WorkflowNotifier`]: terminal workflow step status callbacks
//!
//! Two families of implementations are provided: in-memory ones in
//! [`memory`] (tests, local dry runs) and AWS-backed ones in `aws`
//! (S3, Secrets Manager, ECS/Fargate, Transfer Family).
//!
//! # Example
//!
//! ```no_run
//! use sftp_decrypt::backend::{memory::MemoryObjectStore, ObjectStore};
//! use sftp_decrypt::request::ObjectLocation;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryObjectStore::new();
//! let location = ObjectLocation::new("landing", "in/sftp/alice/file.pgp");
//! store.insert(location.clone(), b"ciphertext".to_vec());
//!
//! assert_eq!(store.object_size(&location).await?, 10);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;

#[cfg(feature = "aws")]
pub mod aws;

pub use error::{ServiceError, ServiceResult};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use tokio::io::AsyncRead;

use crate::request::{CallbackTarget, ObjectLocation};

/// Boxed byte stream handed between backends and the pipeline
pub type ByteReader = Box<dyn AsyncRead + Unpin + Send>;

/// Body of a fetched object together with its declared size
pub struct ObjectBody {
    /// Size declared by storage metadata
    pub size: u64,

    /// Object content
    pub reader: ByteReader,
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Object storage capability
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Size of the object in bytes, from storage metadata
    async fn object_size(&self, location: &ObjectLocation) -> ServiceResult<u64>;

    /// Open the object for streaming reads
    async fn fetch(&self, location: &ObjectLocation) -> ServiceResult<ObjectBody>;

    /// Durably store `length` bytes read from `body`
    async fn put(
        &self,
        location: &ObjectLocation,
        body: ByteReader,
        length: u64,
    ) -> ServiceResult<()>;
}

/// Private key and passphrase used to decrypt one transfer
///
/// Both values stay wrapped in [`SecretString`] so they never show up in
/// `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub private_key: SecretString,
    pub passphrase: SecretString,
}

impl KeyMaterial {
    pub fn new(private_key: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            private_key: SecretString::from(private_key.into()),
            passphrase: SecretString::from(passphrase.into()),
        }
    }
}

/// Failure modes of key retrieval
#[derive(Debug)]
pub enum KeyLookupError {
    /// The secret exists but is not usable key material
    Malformed(String),

    /// The secret could not be read at all
    Service(ServiceError),
}

impl fmt::Display for KeyLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyLookupError::Malformed(reason) => write!(f, "{}", reason),
            KeyLookupError::Service(err) => write!(f, "{}", err),
        }
    }
}

impl From<ServiceError> for KeyLookupError {
    fn from(err: ServiceError) -> Self {
        KeyLookupError::Service(err)
    }
}

#[derive(Deserialize)]
struct PgpSecret {
    #[serde(rename = "PGPPrivateKey", default)]
    private_key: Option<String>,
    #[serde(rename = "PGPPassphrase", default)]
    passphrase: Option<String>,
}

/// Parse the JSON secret body `{"PGPPrivateKey": ..., "PGPPassphrase": ...}`.
///
/// Empty values count as missing.
pub fn parse_key_secret(secret: &str) -> Result<KeyMaterial, KeyLookupError> {
    let parsed: PgpSecret = serde_json::from_str(secret)
        .map_err(|e| KeyLookupError::Malformed(format!("secret is not valid JSON: {}", e)))?;

    match (
        parsed.private_key.filter(|k| !k.is_empty()),
        parsed.passphrase.filter(|p| !p.is_empty()),
    ) {
        (Some(private_key), Some(passphrase)) => Ok(KeyMaterial::new(private_key, passphrase)),
        _ => Err(KeyLookupError::Malformed(
            "PGP credentials missing required fields: PGPPrivateKey and PGPPassphrase"
                .to_string(),
        )),
    }
}

/// Secret storage capability for decryption keys
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Name of the secret holding the key for `server_id`, used in logs and errors
    fn secret_name(&self, server_id: &str) -> String {
        format!("aws/transfer/{}/@pgp-default", server_id)
    }

    /// Fetch the key material for a transfer server
    async fn key_material(&self, server_id: &str) -> Result<KeyMaterial, KeyLookupError>;
}

/// Identifiers of a started delegated task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationHandle {
    pub task_arn: String,
    pub cluster_arn: Option<String>,
}

/// Delegation capability: starts an independent executor run
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Start a task with the given environment and return without waiting
    async fn launch(&self, environment: &[(String, String)]) -> ServiceResult<DelegationHandle>;
}

/// Terminal status of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    Failure,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Success => write!(f, "SUCCESS"),
            StepStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Workflow callback capability
#[async_trait]
pub trait WorkflowNotifier: Send + Sync {
    /// Deliver one step status to the workflow tracker
    async fn send_step_state(
        &self,
        target: CallbackTarget<'_>,
        status: StepStatus,
    ) -> ServiceResult<()>;
}
