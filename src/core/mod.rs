/*!
 * Routing decision and decryption pipeline
 */

pub mod crypto;
pub mod executor;
pub mod format;
pub mod paths;
pub mod progress;
pub mod report;
pub mod router;
pub mod workspace;

pub use executor::{ExecutionSummary, Executor};
pub use format::MessageFormat;
pub use router::{Route, Router, RouterResponse, SizeRouter, TransferEvent};
