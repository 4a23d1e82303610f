mod support;

use lodge_crypto::{MasterKey, seal_private_halves};
use lodge_registry::error::RegistryError;
use lodge_registry::key_source::{
    CachedKeySource, EncryptedEnvelopeKeySource, KeySource, LocalFileKeySource,
};
use lodge_registry::types::DeploymentMode;
use lodge_registry::{BlobStore, MemoryBlobStore, RegistryConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::{StaticKeySource, keys, other_keys};

const ENVELOPE_KEY: &str = "registry/quantum-keys.enc";

fn envelope_source(blobs: &MemoryBlobStore, master: &MasterKey) -> EncryptedEnvelopeKeySource {
    EncryptedEnvelopeKeySource::new(
        Some(keys().public_config()),
        Some(master.clone()),
        Arc::new(blobs.clone()),
        ENVELOPE_KEY,
    )
}

// --- Envelope source ---

#[tokio::test]
async fn envelope_source_without_config_is_none() {
    let source = EncryptedEnvelopeKeySource::new(None, None, Arc::new(MemoryBlobStore::new()), ENVELOPE_KEY);
    assert!(source.load_key_set().await.unwrap().is_none());
}

#[tokio::test]
async fn envelope_source_without_envelope_blob_is_none() {
    let source = envelope_source(&MemoryBlobStore::new(), &MasterKey::generate());
    assert!(source.load_key_set().await.unwrap().is_none());
}

#[tokio::test]
async fn envelope_save_then_load() {
    let blobs = MemoryBlobStore::new();
    let master = MasterKey::generate();
    let source = envelope_source(&blobs, &master);

    source.save_key_set(keys()).await.unwrap();
    assert_eq!(blobs.metadata(ENVELOPE_KEY).await.unwrap().format, "key-envelope");

    let loaded = source.load_key_set().await.unwrap().unwrap();
    assert_eq!(loaded.kem.public_key, keys().kem.public_key);
    assert_eq!(loaded.rsa.public_key, keys().rsa.public_key);
}

#[tokio::test]
async fn envelope_blob_never_contains_private_keys() {
    let blobs = MemoryBlobStore::new();
    envelope_source(&blobs, &MasterKey::generate())
        .save_key_set(keys())
        .await
        .unwrap();

    let stored = String::from_utf8(blobs.get(ENVELOPE_KEY).await.unwrap().unwrap()).unwrap();
    assert!(!stored.contains("PRIVATE KEY"));
    assert!(!stored.contains(&hex::encode(keys().kem.private_key())));
}

#[tokio::test]
async fn envelope_with_wrong_master_key_fails_opaquely() {
    let blobs = MemoryBlobStore::new();
    envelope_source(&blobs, &MasterKey::generate())
        .save_key_set(keys())
        .await
        .unwrap();

    let err = envelope_source(&blobs, &MasterKey::generate())
        .load_key_set()
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Crypto(_)));
    assert_eq!(err.to_string(), "registry temporarily unavailable");
}

#[tokio::test]
async fn envelope_sealed_public_halves_override_stale_config() {
    let blobs = MemoryBlobStore::new();
    let master = MasterKey::generate();
    envelope_source(&blobs, &master).save_key_set(keys()).await.unwrap();

    // Configuration still names a different key set.
    let source = EncryptedEnvelopeKeySource::new(
        Some(other_keys().public_config()),
        Some(master),
        Arc::new(blobs),
        ENVELOPE_KEY,
    );
    let loaded = source.load_key_set().await.unwrap().unwrap();
    assert_eq!(loaded.kem.public_key, keys().kem.public_key);
    assert_eq!(loaded.rsa.public_key, keys().rsa.public_key);
}

#[tokio::test]
async fn envelope_without_sealed_public_halves_uses_config() {
    let blobs = MemoryBlobStore::new();
    let master = MasterKey::generate();
    let mut private = keys().private_halves();
    private.public_keys = None;
    let envelope = seal_private_halves(&private, master.as_bytes()).unwrap();
    blobs
        .set(ENVELOPE_KEY, envelope.to_bytes().unwrap(), support::metadata("key-envelope"))
        .await
        .unwrap();

    let loaded = envelope_source(&blobs, &master).load_key_set().await.unwrap().unwrap();
    assert_eq!(loaded.kem.public_key, keys().kem.public_key);

    // Without sealed halves a mismatched configuration still fails the pairing check.
    let source = EncryptedEnvelopeKeySource::new(
        Some(other_keys().public_config()),
        Some(master),
        Arc::new(blobs),
        ENVELOPE_KEY,
    );
    assert!(source.load_key_set().await.is_err());
}

#[tokio::test]
async fn envelope_save_without_master_key_is_keys_unavailable() {
    let source = EncryptedEnvelopeKeySource::new(
        Some(keys().public_config()),
        None,
        Arc::new(MemoryBlobStore::new()),
        ENVELOPE_KEY,
    );
    let err = source.save_key_set(keys()).await.unwrap_err();
    assert!(matches!(err, RegistryError::KeysUnavailable(_)));
}

#[tokio::test]
async fn envelope_source_from_config() {
    let master = MasterKey::generate();
    let public = keys().public_config();
    let config = RegistryConfig {
        kem_public_key: Some(public.kem_public_key),
        rsa_public_key: Some(public.rsa_public_key),
        master_key: Some(master.to_hex()),
        key_envelope_blob_key: "keys/envelope.json".into(),
        ..Default::default()
    };
    let blobs = MemoryBlobStore::new();
    let source = EncryptedEnvelopeKeySource::from_config(&config, Arc::new(blobs.clone())).unwrap();

    source.save_key_set(keys()).await.unwrap();
    assert!(blobs.get("keys/envelope.json").await.unwrap().is_some());
    assert!(source.load_key_set().await.unwrap().is_some());
}

// --- Local files ---

#[test]
fn local_files_rejected_in_production() {
    let err = LocalFileKeySource::new(DeploymentMode::Production, ".lodge/keys").unwrap_err();
    assert!(matches!(err, RegistryError::Config(_)));
}

#[tokio::test]
async fn local_files_absent_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let source = LocalFileKeySource::new(DeploymentMode::Local, dir.path()).unwrap();
    assert!(source.load_key_set().await.unwrap().is_none());
}

#[tokio::test]
async fn local_files_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let source = LocalFileKeySource::new(DeploymentMode::Local, dir.path().join("keys")).unwrap();

    source.save_key_set(keys()).await.unwrap();
    let loaded = source.load_key_set().await.unwrap().unwrap();
    assert_eq!(loaded.kem.public_key, keys().kem.public_key);
    assert_eq!(loaded.rsa.private_key(), keys().rsa.private_key());
}

#[tokio::test]
async fn local_files_with_bad_hex_are_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = LocalFileKeySource::new(DeploymentMode::Local, dir.path()).unwrap();
    source.save_key_set(keys()).await.unwrap();
    std::fs::write(dir.path().join("kem_public.hex"), "not hex").unwrap();

    let err = source.load_key_set().await.unwrap_err();
    assert!(matches!(err, RegistryError::Config(_)));
}

// --- Cache ---

#[tokio::test]
async fn cached_source_loads_once() {
    let inner = Arc::new(StaticKeySource::with_keys(keys()));
    let cached = CachedKeySource::new(SharedSource(inner.clone()));
    for _ in 0..5 {
        assert!(cached.load_key_set().await.unwrap().is_some());
    }
    assert_eq!(inner.loads(), 1);
}

#[tokio::test]
async fn cached_source_requeries_absence() {
    let inner = Arc::new(StaticKeySource::empty());
    let cached = CachedKeySource::new(SharedSource(inner.clone()));

    assert!(cached.load_key_set().await.unwrap().is_none());
    assert!(cached.load_key_set().await.unwrap().is_none());
    assert_eq!(inner.loads(), 2);

    // Keys provisioned behind the cache's back are picked up, then cached.
    inner.save_key_set(keys()).await.unwrap();
    assert!(cached.load_key_set().await.unwrap().is_some());
    assert!(cached.load_key_set().await.unwrap().is_some());
    assert_eq!(inner.loads(), 3);

    cached.invalidate().await;
    cached.load_key_set().await.unwrap();
    assert_eq!(inner.loads(), 4);
}

#[tokio::test]
async fn cached_source_concurrent_loads_hit_inner_once() {
    let inner = Arc::new(StaticKeySource::with_keys(keys()));
    let cached = Arc::new(CachedKeySource::new(SharedSource(inner.clone())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cached = cached.clone();
            tokio::spawn(async move { cached.load_key_set().await.unwrap().is_some() })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(inner.loads(), 1);
}

#[tokio::test]
async fn cached_source_save_replaces_cached_keys() {
    let inner = Arc::new(StaticKeySource::with_keys(keys()));
    let cached = CachedKeySource::new(SharedSource(inner.clone()));
    cached.load_key_set().await.unwrap();

    cached.save_key_set(other_keys()).await.unwrap();
    let loaded = cached.load_key_set().await.unwrap().unwrap();
    assert_eq!(loaded.kem.public_key, other_keys().kem.public_key);
    assert_eq!(inner.loads(), 1);
}

/// Lets a test keep a handle on the inner source's counters.
struct SharedSource(Arc<StaticKeySource>);

#[async_trait::async_trait]
impl KeySource for SharedSource {
    async fn load_key_set(
        &self,
    ) -> lodge_registry::RegistryResult<Option<Arc<lodge_crypto::QuantumKeySet>>> {
        self.0.load_key_set().await
    }

    async fn save_key_set(&self, keys: &lodge_crypto::QuantumKeySet) -> lodge_registry::RegistryResult<()> {
        self.0.save_key_set(keys).await
    }
}
