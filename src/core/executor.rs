/*!
 * Decryption pipeline executor
 *
 * Runs one [`TransferRequest`] end to end:
 *
 * ```text
 * START -> KEY_RETRIEVED -> DOWNLOADED -> FORMAT_DETECTED -> DECRYPTED -> UPLOADED
 *       \__________________________ any failure __________________________/
 *                                      |
 *                                 CLEANED_UP -> REPORTED(SUCCESS | FAILURE)
 * ```
 *
 * Stages run strictly one after another. Both working files are removed on
 * every exit path before the single terminal status is reported, and the
 * decrypted file is only uploaded when every earlier stage succeeded.
 */

use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::backend::{
    ByteReader, KeyStore, ObjectStore, ServiceError, StepStatus, WorkflowNotifier,
};
use crate::config::ExecutorConfig;
use crate::core::crypto::decrypt_file;
use crate::core::format::{detect_format, MessageFormat};
use crate::core::progress::{ProgressTracker, Tracked};
use crate::core::report::WorkflowReporter;
use crate::core::workspace::WorkingFiles;
use crate::error::{DecryptError, Result};
use crate::request::{env_keys, ObjectLocation, TransferRequest, WorkflowContext};

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub source: ObjectLocation,
    pub destination: ObjectLocation,
    pub format: MessageFormat,
    pub encrypted_bytes: u64,
    pub decrypted_bytes: u64,
}

/// Pipeline executor bound to its collaborators
pub struct Executor {
    store: Arc<dyn ObjectStore>,
    keys: Arc<dyn KeyStore>,
    notifier: Arc<dyn WorkflowNotifier>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        keys: Arc<dyn KeyStore>,
        notifier: Arc<dyn WorkflowNotifier>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            keys,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run the whole pipeline for `request`.
    ///
    /// Cleanup and reporting happen before this returns, on success and
    /// failure alike. A failed status callback does not change the result.
    pub async fn run(&self, request: &TransferRequest) -> Result<ExecutionSummary> {
        let reporter = WorkflowReporter::new(self.notifier.clone(), request.workflow.clone());
        let files = WorkingFiles::allocate(&self.config.work_dir, request.source.file_name());

        info!(
            source = %request.source,
            destination = %request.destination,
            server_id = %request.server_id,
            callbacks = reporter.is_active(),
            "Starting decryption pipeline"
        );

        let outcome = self.process(request, &files).await;

        // Cleanup failures are logged inside and never replace the outcome
        files.cleanup().await;

        match outcome {
            Ok(summary) => {
                info!(
                    source = %summary.source,
                    destination = %summary.destination,
                    format = %summary.format,
                    encrypted_bytes = summary.encrypted_bytes,
                    decrypted_bytes = summary.decrypted_bytes,
                    "Decryption pipeline completed"
                );
                reporter.report(StepStatus::Success).await;
                Ok(summary)
            }
            Err(e) => {
                error!(
                    source = %request.source,
                    stage = %e.stage(),
                    error = %e,
                    "Decryption pipeline failed"
                );
                reporter.report(StepStatus::Failure).await;
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        request: &TransferRequest,
        files: &WorkingFiles,
    ) -> Result<ExecutionSummary> {
        let secret = self.keys.secret_name(&request.server_id);
        let material = self
            .keys
            .key_material(&request.server_id)
            .await
            .map_err(|e| DecryptError::CredentialsUnavailable {
                secret: secret.clone(),
                reason: e.to_string(),
            })?;
        info!(secret = %secret, "Retrieved PGP credentials");

        let encrypted_bytes = self.download(&request.source, files.encrypted()).await?;

        let format = detect_format(files.encrypted()).await.map_err(|e| {
            DecryptError::decryption(
                anyhow::Error::new(e).context("Failed to sample encrypted file"),
            )
        })?;
        info!(format = %format, "Detected message format");

        let decrypted_bytes = decrypt_file(
            files.encrypted(),
            files.decrypted(),
            &material,
            format,
            self.config.stream_buffer_bytes,
        )
        .await?;
        log_local_size("Decrypted", files.decrypted(), decrypted_bytes).await;

        self.upload(files.decrypted(), &request.destination).await?;

        Ok(ExecutionSummary {
            source: request.source.clone(),
            destination: request.destination.clone(),
            format,
            encrypted_bytes,
            decrypted_bytes,
        })
    }

    /// Stream the source object into `path`
    async fn download(&self, location: &ObjectLocation, path: &Path) -> Result<u64> {
        let fetch_failed = |source: ServiceError| DecryptError::FetchFailed {
            location: location.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| fetch_failed(e.into()))?;

        info!(bucket = %location.bucket, key = %location.key, "Downloading encrypted file");
        let body = self.store.fetch(location).await.map_err(fetch_failed)?;

        let progress = ProgressTracker::start("Download", body.size);
        let copied = async {
            let mut reader = Tracked::new(body.reader, progress.clone());
            let mut file = tokio::fs::File::create(path).await?;
            let copied = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(copied)
        }
        .await;
        progress.finish();

        let copied = copied.map_err(|e| fetch_failed(e.into()))?;
        log_local_size("Downloaded", path, copied).await;
        Ok(copied)
    }

    /// Stream the decrypted file at `path` to `location`
    async fn upload(&self, path: &Path, location: &ObjectLocation) -> Result<u64> {
        let delivery_failed = |source: ServiceError| DecryptError::DeliveryFailed {
            location: location.clone(),
            source,
        };

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| delivery_failed(e.into()))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| delivery_failed(e.into()))?
            .len();

        info!(bucket = %location.bucket, key = %location.key, bytes = length, "Uploading decrypted file");

        let progress = ProgressTracker::start("Upload", length);
        let body: ByteReader = Box::new(Tracked::new(file, progress.clone()));
        let result = self.store.put(location, body, length).await;
        progress.finish();

        result.map_err(delivery_failed)?;
        info!(destination = %location, bytes = length, "Uploaded decrypted file");
        Ok(length)
    }
}

/// Read the request and executor settings from environment-style lookups.
///
/// When either is invalid no pipeline starts, but the workflow named by
/// whatever callback keys are present still receives its `FAILURE`.
pub async fn load_settings<F>(
    lookup: F,
    notifier: Arc<dyn WorkflowNotifier>,
) -> Result<(TransferRequest, ExecutorConfig)>
where
    F: Fn(&str) -> Option<String>,
{
    let settings = TransferRequest::from_lookup(&lookup)
        .and_then(|request| ExecutorConfig::from_lookup(&lookup).map(|config| (request, config)));

    match settings {
        Ok(settings) => Ok(settings),
        Err(e) => {
            error!(stage = %e.stage(), error = %e, "Executor settings invalid");
            let workflow = WorkflowContext::new(
                lookup(env_keys::WORKFLOW_ID),
                lookup(env_keys::EXECUTION_ID),
                lookup(env_keys::WORKFLOW_TOKEN),
            );
            WorkflowReporter::new(notifier, workflow)
                .report(StepStatus::Failure)
                .await;
            Err(e)
        }
    }
}

async fn log_local_size(what: &str, path: &Path, expected: u64) {
    match tokio::fs::metadata(path).await {
        Ok(meta) => info!(
            path = %path.display(),
            bytes = meta.len(),
            "{} file size: {:.2} MB",
            what,
            meta.len() as f64 / (1024.0 * 1024.0)
        ),
        Err(e) => info!(
            path = %path.display(),
            bytes = expected,
            error = %e,
            "{} file size unavailable",
            what
        ),
    }
}
