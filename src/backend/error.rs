//! Error type shared by all collaborator backends

use std::io;
use thiserror::Error;

/// Result type alias for backend operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised by storage, secret, delegation and callback backends
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Requested object or secret does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access denied by the remote service
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Transport-level failure talking to the service
    #[error("Network error: {0}")]
    Network(String),

    /// Service answered with an error
    #[error("Service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Service answered, but not with what was expected
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local I/O error while feeding or draining a stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(feature = "aws")]
impl<E, R> From<aws_sdk_s3::error::SdkError<E, R>> for ServiceError
where
    E: aws_sdk_s3::error::ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    // The smithy error types are shared by every AWS SDK crate, so this covers
    // Secrets Manager, ECS and Transfer errors as well.
    fn from(error: aws_sdk_s3::error::SdkError<E, R>) -> Self {
        use aws_sdk_s3::error::SdkError;

        match error {
            SdkError::DispatchFailure(e) => {
                ServiceError::Network(format!("Network dispatch failure: {:?}", e))
            }
            SdkError::TimeoutError(_) => ServiceError::Network("Request timed out".to_string()),
            SdkError::ResponseError(e) => {
                ServiceError::Network(format!("Response error: {:?}", e))
            }
            SdkError::ServiceError(e) => {
                let err = e.into_err();
                let code = err.code().unwrap_or("Unknown").to_string();
                let message = err.message().map(str::to_string).unwrap_or_else(|| err.to_string());
                match code.as_str() {
                    "NoSuchKey" | "NotFound" | "NoSuchBucket" | "ResourceNotFoundException" => {
                        ServiceError::NotFound(message)
                    }
                    "AccessDenied" | "AccessDeniedException" => ServiceError::AccessDenied(message),
                    _ => ServiceError::Service { code, message },
                }
            }
            other => ServiceError::Service {
                code: "Sdk".to_string(),
                message: format!("{:?}", other),
            },
        }
    }
}
