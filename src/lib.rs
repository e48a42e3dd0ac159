/*!
 * sftp-decrypt - PGP decryption for files landing on an SFTP transfer gateway
 *
 * Two cooperating entry points:
 * - a Router that looks at an uploaded object's size and either delegates
 *   decryption to an independent executor task or rejects the request
 * - a pipeline Executor that fetches the encrypted object, detects its
 *   encoding, decrypts it, uploads the plaintext, removes its working files
 *   and reports the outcome to the owning workflow
 *
 * Every external service is reached through a capability trait in
 * [`backend`], so the whole pipeline runs against in-memory fakes in tests.
 */

pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod request;

// Re-export commonly used types
pub use config::{ExecutorConfig, LogConfig, RouterConfig};
pub use core::{ExecutionSummary, Executor, Router, RouterResponse, TransferEvent};
pub use error::{DecryptError, Result};
pub use request::{ObjectLocation, TransferRequest, WorkflowContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
