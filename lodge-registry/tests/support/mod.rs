#![allow(dead_code)]

use async_trait::async_trait;
use lodge_crypto::{QuantumKeySet, SensitiveBytes32, cipher};
use lodge_registry::audit::{AuditError, AuditSink};
use lodge_registry::error::{RegistryError, RegistryResult};
use lodge_registry::key_source::KeySource;
use lodge_registry::types::{BlobMetadata, Registry, TenantRecord};
use lodge_registry::{BlobStore, MemoryBlobStore};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Routes crate logs to the test harness; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// RSA-2048 keeps generation fast; production keys use 4096 bits.
pub fn keys() -> &'static QuantumKeySet {
    static KEYS: OnceLock<QuantumKeySet> = OnceLock::new();
    KEYS.get_or_init(|| QuantumKeySet::generate_with_rsa_bits(2048).unwrap())
}

pub fn other_keys() -> &'static QuantumKeySet {
    static KEYS: OnceLock<QuantumKeySet> = OnceLock::new();
    KEYS.get_or_init(|| QuantumKeySet::generate_with_rsa_bits(2048).unwrap())
}

pub fn sample_registry() -> Registry {
    let mut registry = Registry::new();
    registry.upsert(
        "42",
        TenantRecord::new()
            .with_field("name", "Test Lodge")
            .with_field("apiToken", "tok-secret"),
    );
    registry.upsert("7", TenantRecord::new().with_field("name", "Harbor Lodge"));
    registry
}

/// `v1:iv:tag:ct` (or the unprefixed form) under a static AES key.
pub fn legacy_blob(key: &SensitiveBytes32, plaintext: &[u8], prefixed: bool) -> Vec<u8> {
    let sealed = cipher::encrypt(key.as_bytes(), plaintext, cipher::IvLength::Wide).unwrap();
    let body = format!(
        "{}:{}:{}",
        hex::encode(&sealed.iv),
        hex::encode(sealed.auth_tag),
        hex::encode(&sealed.ciphertext)
    );
    if prefixed {
        format!("v1:{body}").into_bytes()
    } else {
        body.into_bytes()
    }
}

pub fn metadata(format: &str) -> BlobMetadata {
    BlobMetadata::for_bytes(b"", "text/plain", format)
}

/// Key source with fixed contents that counts loads.
#[derive(Default)]
pub struct StaticKeySource {
    keys: Mutex<Option<Arc<QuantumKeySet>>>,
    loads: AtomicUsize,
}

impl StaticKeySource {
    pub fn with_keys(keys: &QuantumKeySet) -> Self {
        Self {
            keys: Mutex::new(Some(Arc::new(keys.clone()))),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn load_key_set(&self) -> RegistryResult<Option<Arc<QuantumKeySet>>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.keys.lock().unwrap().clone())
    }

    async fn save_key_set(&self, keys: &QuantumKeySet) -> RegistryResult<()> {
        *self.keys.lock().unwrap() = Some(Arc::new(keys.clone()));
        Ok(())
    }
}

/// Audit sink that keeps every event name in order.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn metadata_for(&self, event: &str) -> Option<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == event)
            .map(|(_, m)| m.clone())
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &str, metadata: Value) -> Result<(), AuditError> {
        self.events.lock().unwrap().push((event.to_string(), metadata));
        Ok(())
    }
}

pub struct FailingAuditSink;

impl AuditSink for FailingAuditSink {
    fn record(&self, _event: &str, _metadata: Value) -> Result<(), AuditError> {
        Err(AuditError("sink offline".to_string()))
    }
}

/// Blob store whose reads always fail transiently.
pub struct UnavailableBlobStore;

#[async_trait]
impl BlobStore for UnavailableBlobStore {
    async fn get(&self, _key: &str) -> RegistryResult<Option<Vec<u8>>> {
        Err(RegistryError::UpstreamUnavailable("connection reset".to_string()))
    }

    async fn set(&self, _key: &str, _data: Vec<u8>, _metadata: BlobMetadata) -> RegistryResult<()> {
        Err(RegistryError::UpstreamUnavailable("connection reset".to_string()))
    }
}

/// Memory store that sleeps before every call.
pub struct SlowBlobStore {
    pub inner: MemoryBlobStore,
    pub delay: Duration,
}

#[async_trait]
impl BlobStore for SlowBlobStore {
    async fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, data: Vec<u8>, metadata: BlobMetadata) -> RegistryResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, data, metadata).await
    }
}

/// Memory store whose writes to one key fail; reads and other writes succeed.
pub struct FailingWriteBlobStore {
    pub inner: MemoryBlobStore,
    pub failing_key: String,
}

#[async_trait]
impl BlobStore for FailingWriteBlobStore {
    async fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, data: Vec<u8>, metadata: BlobMetadata) -> RegistryResult<()> {
        if key == self.failing_key {
            return Err(RegistryError::UpstreamUnavailable("write rejected".to_string()));
        }
        self.inner.set(key, data, metadata).await
    }
}
