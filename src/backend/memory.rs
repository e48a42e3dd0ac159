//! In-memory backends
//!
//! These keep everything in process memory, count calls, and can be told to
//! fail, so the router and pipeline can be exercised without any remote
//! service.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncReadExt;

use super::{
    parse_key_secret, ByteReader, DelegationHandle, KeyLookupError, KeyMaterial, KeyStore,
    ObjectBody, ObjectStore, ServiceError, ServiceResult, StepStatus, TaskLauncher,
    WorkflowNotifier,
};
use crate::request::{CallbackTarget, ObjectLocation};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    declared_size: Option<u64>,
}

/// Object store backed by a `HashMap`
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<ObjectLocation, StoredObject>>>,
    fetch_failure: Arc<Mutex<Option<String>>>,
    put_failure: Arc<Mutex<Option<String>>>,
    size_calls: Arc<AtomicUsize>,
    fetch_calls: Arc<AtomicUsize>,
    put_calls: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object
    pub fn insert(&self, location: ObjectLocation, data: Vec<u8>) {
        lock(&self.objects).insert(
            location,
            StoredObject {
                data,
                declared_size: None,
            },
        );
    }

    /// Register an object whose metadata reports `size` bytes without
    /// holding that much data
    pub fn insert_declared(&self, location: ObjectLocation, size: u64) {
        lock(&self.objects).insert(
            location,
            StoredObject {
                data: Vec::new(),
                declared_size: Some(size),
            },
        );
    }

    /// Content of a stored object
    pub fn get(&self, location: &ObjectLocation) -> Option<Vec<u8>> {
        lock(&self.objects).get(location).map(|o| o.data.clone())
    }

    pub fn contains(&self, location: &ObjectLocation) -> bool {
        lock(&self.objects).contains_key(location)
    }

    /// Make every subsequent fetch fail with a network error
    pub fn fail_fetches(&self, message: impl Into<String>) {
        *lock(&self.fetch_failure) = Some(message.into());
    }

    /// Make every subsequent put fail with a network error
    pub fn fail_puts(&self, message: impl Into<String>) {
        *lock(&self.put_failure) = Some(message.into());
    }

    pub fn size_calls(&self) -> usize {
        self.size_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn object_size(&self, location: &ObjectLocation) -> ServiceResult<u64> {
        self.size_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.objects)
            .get(location)
            .map(|o| o.declared_size.unwrap_or(o.data.len() as u64))
            .ok_or_else(|| ServiceError::NotFound(location.to_string()))
    }

    async fn fetch(&self, location: &ObjectLocation) -> ServiceResult<ObjectBody> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.fetch_failure).clone() {
            return Err(ServiceError::Network(message));
        }

        let object = lock(&self.objects)
            .get(location)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(location.to_string()))?;

        Ok(ObjectBody {
            size: object.declared_size.unwrap_or(object.data.len() as u64),
            reader: Box::new(std::io::Cursor::new(object.data)),
        })
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        mut body: ByteReader,
        length: u64,
    ) -> ServiceResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.put_failure).clone() {
            return Err(ServiceError::Network(message));
        }

        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        if data.len() as u64 != length {
            return Err(ServiceError::InvalidResponse(format!(
                "declared length {} but received {} bytes",
                length,
                data.len()
            )));
        }

        self.insert(location.clone(), data);
        Ok(())
    }
}

/// Key store holding raw secret strings, parsed exactly like the remote ones
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    secrets: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<AtomicUsize>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store key material for a server as the usual JSON secret
    pub fn insert(&self, server_id: &str, private_key: &str, passphrase: &str) {
        let secret = serde_json::json!({
            "PGPPrivateKey": private_key,
            "PGPPassphrase": passphrase,
        });
        self.insert_raw(server_id, secret.to_string());
    }

    /// Store an arbitrary secret string for a server
    pub fn insert_raw(&self, server_id: &str, secret: impl Into<String>) {
        lock(&self.secrets).insert(self.secret_name(server_id), secret.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn key_material(&self, server_id: &str) -> Result<KeyMaterial, KeyLookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = self.secret_name(server_id);
        let secret = lock(&self.secrets)
            .get(&name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(name))?;
        parse_key_secret(&secret)
    }
}

/// Task launcher that records every environment it is asked to start
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    launches: Arc<Mutex<Vec<Vec<(String, String)>>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent launch fail
    pub fn fail_launches(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    /// Environments of all launches so far
    pub fn launches(&self) -> Vec<Vec<(String, String)>> {
        lock(&self.launches).clone()
    }
}

#[async_trait]
impl TaskLauncher for RecordingLauncher {
    async fn launch(&self, environment: &[(String, String)]) -> ServiceResult<DelegationHandle> {
        if let Some(message) = lock(&self.failure).clone() {
            return Err(ServiceError::Service {
                code: "ClientException".to_string(),
                message,
            });
        }

        let mut launches = lock(&self.launches);
        launches.push(environment.to_vec());
        Ok(DelegationHandle {
            task_arn: format!("arn:memory:task/{}", launches.len()),
            cluster_arn: Some("arn:memory:cluster/default".to_string()),
        })
    }
}

/// One delivered workflow callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCallback {
    pub workflow_id: String,
    pub execution_id: String,
    pub token: String,
    pub status: StepStatus,
}

/// Workflow notifier that records every callback it is asked to send
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    callbacks: Arc<Mutex<Vec<RecordedCallback>>>,
    failure: Arc<Mutex<Option<String>>>,
    attempts: Arc<AtomicUsize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent callback fail after being counted as attempted
    pub fn fail_callbacks(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    /// Successfully delivered callbacks
    pub fn callbacks(&self) -> Vec<RecordedCallback> {
        lock(&self.callbacks).clone()
    }

    /// Delivery attempts, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowNotifier for RecordingNotifier {
    async fn send_step_state(
        &self,
        target: CallbackTarget<'_>,
        status: StepStatus,
    ) -> ServiceResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.failure).clone() {
            return Err(ServiceError::Network(message));
        }

        lock(&self.callbacks).push(RecordedCallback {
            workflow_id: target.workflow_id.to_string(),
            execution_id: target.execution_id.to_string(),
            token: target.token.to_string(),
            status,
        });
        Ok(())
    }
}
