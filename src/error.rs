/*!
 * Error types for the decryption pipeline and router
 */

use std::fmt;

use thiserror::Error;

use crate::backend::ServiceError;
use crate::request::ObjectLocation;

pub type Result<T> = std::result::Result<T, DecryptError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Every way a router invocation or pipeline run can fail
#[derive(Debug, Error)]
pub enum DecryptError {
    /// Object key does not have the `in/sftp/{user}/...` shape
    #[error("Invalid S3 key format: {key}. Expected: in/sftp/{{username}}/...")]
    MalformedKey { key: String },

    /// The workflow event carried no file location
    #[error("No file location provided in event")]
    MissingFileLocation,

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Size inquiry against object storage failed
    #[error("Failed to get file size for {location}: {source}")]
    SizeLookupFailed {
        location: ObjectLocation,
        #[source]
        source: ServiceError,
    },

    /// Key material missing, malformed or incomplete
    #[error("Failed to retrieve PGP credentials from {secret}: {reason}")]
    CredentialsUnavailable { secret: String, reason: String },

    /// Download of the encrypted object failed
    #[error("Failed to download {location}: {source}")]
    FetchFailed {
        location: ObjectLocation,
        #[source]
        source: ServiceError,
    },

    /// Key unlock, parse or decrypt failure
    #[error("Decryption failed: {0:#}")]
    DecryptionFailed(#[source] anyhow::Error),

    /// Upload of the decrypted object failed
    #[error("Failed to upload {location}: {source}")]
    DeliveryFailed {
        location: ObjectLocation,
        #[source]
        source: ServiceError,
    },

    /// The delegated task could not be started
    #[error("Failed to start Fargate task: {0}")]
    DelegationFailed(String),

    /// Workflow status callback could not be delivered
    #[error("Failed to send workflow callback: {0}")]
    CallbackFailed(String),

    /// Process-level failure outside the pipeline (runtime, stdio)
    #[error("{0}")]
    Other(String),
}

impl DecryptError {
    /// Pipeline or router stage the error belongs to, used as a log field
    pub fn stage(&self) -> Stage {
        match self {
            DecryptError::MalformedKey { .. } | DecryptError::MissingFileLocation => Stage::Parse,
            DecryptError::Config(_) => Stage::Configuration,
            DecryptError::SizeLookupFailed { .. } => Stage::SizeLookup,
            DecryptError::CredentialsUnavailable { .. } => Stage::KeyRetrieval,
            DecryptError::FetchFailed { .. } => Stage::Download,
            DecryptError::DecryptionFailed(_) => Stage::Decrypt,
            DecryptError::DeliveryFailed { .. } => Stage::Upload,
            DecryptError::DelegationFailed(_) => Stage::Delegation,
            DecryptError::CallbackFailed(_) => Stage::Report,
            DecryptError::Other(_) => Stage::Startup,
        }
    }

    /// Whether the failure stems from the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DecryptError::MalformedKey { .. } | DecryptError::MissingFileLocation
        )
    }

    /// HTTP-style status class for router responses
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DecryptError::Config(_) => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }

    pub(crate) fn decryption(error: impl Into<anyhow::Error>) -> Self {
        DecryptError::DecryptionFailed(error.into())
    }
}

/// Named stage of a router invocation or pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Startup,
    Parse,
    Configuration,
    SizeLookup,
    KeyRetrieval,
    Download,
    Decrypt,
    Upload,
    Delegation,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Startup => write!(f, "startup"),
            Stage::Parse => write!(f, "parse"),
            Stage::Configuration => write!(f, "configuration"),
            Stage::SizeLookup => write!(f, "size_lookup"),
            Stage::KeyRetrieval => write!(f, "key_retrieval"),
            Stage::Download => write!(f, "download"),
            Stage::Decrypt => write!(f, "decrypt"),
            Stage::Upload => write!(f, "upload"),
            Stage::Delegation => write!(f, "delegation"),
            Stage::Report => write!(f, "report"),
        }
    }
}
