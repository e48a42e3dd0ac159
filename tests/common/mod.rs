//! Shared fixtures for the integration tests: throwaway OpenPGP keys,
//! encrypted payloads and collaborators wired to in-memory backends.

#![allow(dead_code, deprecated)]

use sequoia_openpgp as openpgp;
use std::io::Write;
use std::sync::Arc;

use openpgp::cert::prelude::*;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Armorer, Encryptor, LiteralWriter, Message};
use openpgp::serialize::SerializeInto;

use sftp_decrypt::backend::memory::{
    MemoryKeyStore, MemoryObjectStore, RecordingLauncher, RecordingNotifier,
};
use sftp_decrypt::config::{DelegationConfig, RouterConfig};
use sftp_decrypt::{
    Executor, ExecutorConfig, ObjectLocation, Router, TransferRequest, WorkflowContext,
};
use tempfile::TempDir;

pub const SERVER_ID: &str = "s-0123456789abcdef0";
pub const PASSPHRASE: &str = "correct horse battery staple";
pub const SOURCE_BUCKET: &str = "transfer-landing";
pub const DESTINATION_BUCKET: &str = "transfer-clear";

/// A freshly generated, passphrase-protected key
pub struct TestKey {
    pub cert: Cert,
    pub armored_secret: String,
}

impl TestKey {
    pub fn generate() -> Self {
        let (cert, _revocation) = CertBuilder::new()
            .add_userid("SFTP Transfer <transfer@example.org>")
            .add_transport_encryption_subkey()
            .set_password(Some(PASSPHRASE.into()))
            .generate()
            .unwrap();
        let armored_secret =
            String::from_utf8(cert.as_tsk().armored().to_vec().unwrap()).unwrap();
        Self {
            cert,
            armored_secret,
        }
    }

    /// Encrypt `plaintext` to this key, ASCII-armored or binary
    pub fn encrypt(&self, plaintext: &[u8], armor: bool) -> Vec<u8> {
        let policy = StandardPolicy::new();
        let recipients = self
            .cert
            .keys()
            .with_policy(&policy, None)
            .supported()
            .for_transport_encryption();

        let mut sink = Vec::new();
        {
            let message = Message::new(&mut sink);
            let message = if armor {
                Armorer::new(message).build().unwrap()
            } else {
                message
            };
            let message = Encryptor::for_recipients(message, recipients)
                .build()
                .unwrap();
            let mut literal = LiteralWriter::new(message).build().unwrap();
            literal.write_all(plaintext).unwrap();
            literal.finalize().unwrap();
        }
        sink
    }
}

/// Deterministic, non-repeating-looking plaintext of `len` bytes
pub fn plaintext(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8)
        .collect()
}

pub fn workflow() -> WorkflowContext {
    WorkflowContext::new(
        Some("w-1234567890abcdef0".to_string()),
        Some("e-7f1c2d3a".to_string()),
        Some("callback-token".to_string()),
    )
}

/// Request for `user`'s upload at `rest` under their landing prefix
pub fn request(user: &str, rest: &str, destination: &str) -> TransferRequest {
    TransferRequest {
        source: ObjectLocation::new(SOURCE_BUCKET, format!("in/sftp/{}/{}", user, rest)),
        destination: ObjectLocation::new(DESTINATION_BUCKET, destination),
        server_id: SERVER_ID.to_string(),
        workflow: workflow(),
    }
}

/// Executor over in-memory backends, working in a private temp dir
pub struct PipelineHarness {
    pub store: MemoryObjectStore,
    pub keys: MemoryKeyStore,
    pub notifier: RecordingNotifier,
    pub executor: Executor,
    pub work_dir: TempDir,
}

impl PipelineHarness {
    pub fn new() -> Self {
        Self::with_stream_buffer(ExecutorConfig::default().stream_buffer_bytes)
    }

    pub fn with_stream_buffer(stream_buffer_bytes: usize) -> Self {
        let work_dir = TempDir::new().unwrap();
        let store = MemoryObjectStore::new();
        let keys = MemoryKeyStore::new();
        let notifier = RecordingNotifier::new();
        let executor = Executor::new(
            Arc::new(store.clone()),
            Arc::new(keys.clone()),
            Arc::new(notifier.clone()),
            ExecutorConfig {
                work_dir: work_dir.path().to_path_buf(),
                stream_buffer_bytes,
            },
        );
        Self {
            store,
            keys,
            notifier,
            executor,
            work_dir,
        }
    }

    /// Files left behind in the working directory
    pub fn leftover_files(&self) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(self.work_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

pub fn router_config(threshold_bytes: u64, server_id: Option<&str>) -> RouterConfig {
    RouterConfig {
        threshold_bytes,
        destination_bucket: DESTINATION_BUCKET.to_string(),
        server_id: server_id.map(String::from),
        delegation: DelegationConfig {
            cluster: "decrypt-cluster".to_string(),
            task_definition: "decrypt-task:3".to_string(),
            subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            security_group: "sg-0abc".to_string(),
            container_name: "decrypt-container".to_string(),
            assign_public_ip: true,
        },
    }
}

/// Router over in-memory backends
pub struct RouterHarness {
    pub store: MemoryObjectStore,
    pub launcher: RecordingLauncher,
    pub notifier: RecordingNotifier,
    pub router: Router,
}

impl RouterHarness {
    pub fn new(config: RouterConfig) -> Self {
        let store = MemoryObjectStore::new();
        let launcher = RecordingLauncher::new();
        let notifier = RecordingNotifier::new();
        let router = Router::new(
            Arc::new(store.clone()),
            Arc::new(launcher.clone()),
            Arc::new(notifier.clone()),
            config,
        );
        Self {
            store,
            launcher,
            notifier,
            router,
        }
    }
}
