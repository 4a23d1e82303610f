//! Registry load/save on top of a blob store and the hybrid cipher.
//!
//! This is the trust boundary: cryptographic detail is logged here and
//! replaced by an opaque error before it leaves.

use crate::audit::{self, AuditSink, TracingAuditSink};
use crate::blob_store::{BlobStore, FsBlobStore};
use crate::cache::RegistryCache;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::key_source::{CachedKeySource, EncryptedEnvelopeKeySource, KeySource, LocalFileKeySource};
use crate::s3_store::S3BlobStore;
use crate::types::{BlobMetadata, DeploymentMode, Registry};
use lodge_crypto::{CiphertextFormat, CryptoError, HybridRegistryCipher, PublicKeyConfig, QuantumKeySet};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Loads and saves the tenant registry.
pub struct RegistryStore {
    mode: DeploymentMode,
    blobs: Arc<dyn BlobStore>,
    keys: Arc<dyn KeySource>,
    cipher: HybridRegistryCipher,
    audit: Arc<dyn AuditSink>,
    registry_key: String,
    timeout: Duration,
    cache: RegistryCache,
}

impl RegistryStore {
    /// Store with the blob key, timeout and cache TTL of
    /// [`RegistryConfig::default`].
    pub fn new(mode: DeploymentMode, blobs: Arc<dyn BlobStore>, keys: Arc<dyn KeySource>) -> Self {
        let defaults = RegistryConfig::default();
        Self {
            mode,
            blobs,
            keys,
            cipher: HybridRegistryCipher::new(),
            audit: Arc::new(TracingAuditSink),
            timeout: defaults.blob_timeout(),
            cache: RegistryCache::new(defaults.cache_ttl()),
            registry_key: defaults.registry_blob_key,
        }
    }

    pub fn with_cipher(mut self, cipher: HybridRegistryCipher) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_registry_key(mut self, key: impl Into<String>) -> Self {
        self.registry_key = key.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = RegistryCache::new(ttl);
        self
    }

    /// Wires a store from configuration over the given blob store.
    ///
    /// Local mode without a master key reads cleartext key files from
    /// `<local_dir>/keys`; everything else uses the sealed envelope.
    pub fn from_config(config: &RegistryConfig, blobs: Arc<dyn BlobStore>) -> RegistryResult<Self> {
        let mode = config.deployment_mode;
        let keys: Arc<dyn KeySource> = if mode.is_local() && config.master_key.is_none() {
            let source = LocalFileKeySource::new(mode, config.local_dir.join("keys"))?;
            Arc::new(CachedKeySource::new(source))
        } else {
            let source = EncryptedEnvelopeKeySource::from_config(config, blobs.clone())?;
            Arc::new(CachedKeySource::new(source))
        };

        let mut cipher = HybridRegistryCipher::new();
        if let Some(legacy) = config.legacy_key()? {
            cipher = cipher.with_legacy_key(legacy);
        }

        Ok(Self::new(mode, blobs, keys)
            .with_cipher(cipher)
            .with_registry_key(config.registry_blob_key.clone())
            .with_timeout(config.blob_timeout())
            .with_cache_ttl(config.cache_ttl()))
    }

    /// Like [`from_config`](Self::from_config), choosing the blob store by
    /// mode: the local filesystem in development, S3 in production.
    pub async fn connect(config: &RegistryConfig) -> RegistryResult<Self> {
        let blobs: Arc<dyn BlobStore> = match config.deployment_mode {
            DeploymentMode::Local => Arc::new(FsBlobStore::new(config.local_dir.clone())),
            DeploymentMode::Production => Arc::new(S3BlobStore::from_config(config).await),
        };
        info!("registry store connected in {} mode", config.deployment_mode);
        Self::from_config(config, blobs)
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn registry_key(&self) -> &str {
        &self.registry_key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl()
    }

    /// Reads and decrypts the registry. A missing blob is an empty registry.
    pub async fn load(&self) -> RegistryResult<Registry> {
        let Some(bytes) = self.timed("registry get", self.blobs.get(&self.registry_key)).await? else {
            debug!("registry blob {} not found, starting empty", self.registry_key);
            return Ok(Registry::new());
        };

        let text = String::from_utf8(bytes).map_err(|_| {
            RegistryError::Crypto(CryptoError::MalformedCiphertext("registry blob is not UTF-8".to_string()))
        })?;

        let format = CiphertextFormat::detect(&text);
        let keys = match format {
            CiphertextFormat::HybridV2 => Some(self.load_keys().await?.ok_or_else(|| {
                RegistryError::KeysUnavailable(
                    "registry is v2-encrypted but no quantum key set is available".to_string(),
                )
            })?),
            _ => None,
        };

        let opened = self
            .cipher
            .open(&text, keys.as_deref())
            .map_err(|e| self.crypto_failure("decrypt", e))?;

        if !opened.decrypted {
            self.check_downgrade(opened.format)?;
        }

        let registry = Registry::from_json_bytes(&opened.plaintext)?;
        audit::emit(
            &self.audit,
            audit::EVENT_REGISTRY_LOADED,
            json!({ "format": opened.format.to_string(), "tenants": registry.len() }),
        );
        Ok(registry)
    }

    /// Cached read; falls back to [`load`](Self::load) once the TTL expires.
    pub async fn load_cached(&self) -> RegistryResult<Arc<Registry>> {
        if let Some(registry) = self.cache.get().await {
            return Ok(registry);
        }
        let registry = self.load().await?;
        Ok(self.cache.put(registry).await)
    }

    /// Serializes, encrypts, and writes the registry.
    ///
    /// Without keys this fails in production and writes plaintext only in
    /// local mode.
    pub async fn save(&self, registry: &Registry) -> RegistryResult<()> {
        match self.load_keys().await? {
            Some(keys) => self.write_encrypted(registry, &keys).await?,
            None if self.mode.is_local() => {
                let plaintext = registry.to_json_bytes()?;
                warn!("no quantum keys configured; saving registry as plaintext (local mode)");
                let metadata = BlobMetadata::for_bytes(&plaintext, "application/json", "plaintext");
                self.timed("registry set", self.blobs.set(&self.registry_key, plaintext, metadata))
                    .await?;
                audit::emit(
                    &self.audit,
                    audit::EVENT_PLAINTEXT_SAVED,
                    json!({ "tenants": registry.len() }),
                );
            }
            None => {
                return Err(RegistryError::KeysUnavailable(
                    "refusing to save the registry without encryption keys in production".to_string(),
                ));
            }
        }

        self.cache.put(registry.clone()).await;
        Ok(())
    }

    /// Re-encrypts the registry under `new_keys` and stores their envelope
    /// through this store's key source. Returns the public halves to
    /// distribute through configuration.
    ///
    /// If the registry write fails after the new envelope is stored, the old
    /// envelope is restored so the stored registry stays readable.
    pub async fn rotate_key_set(&self, new_keys: QuantumKeySet) -> RegistryResult<PublicKeyConfig> {
        let old_keys = self.load_keys().await?.ok_or_else(|| {
            RegistryError::KeysUnavailable("cannot rotate without the current key set".to_string())
        })?;
        new_keys.verify_consistency()?;

        let registry = self.load().await?;
        self.save_keys(&new_keys).await?;
        audit::emit(&self.audit, audit::EVENT_ENVELOPE_SAVED, json!({ "reason": "rotation" }));

        if let Err(e) = self.write_encrypted(&registry, &new_keys).await {
            warn!("registry write failed during key rotation, restoring previous envelope: {e}");
            self.save_keys(&old_keys).await?;
            return Err(e);
        }

        self.cache.put(registry.clone()).await;
        audit::emit(
            &self.audit,
            audit::EVENT_KEYS_ROTATED,
            json!({ "tenants": registry.len() }),
        );
        info!("rotated registry key set");
        Ok(new_keys.public_config())
    }

    /// Drops the cached registry.
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }

    async fn load_keys(&self) -> RegistryResult<Option<Arc<QuantumKeySet>>> {
        self.timed("key set load", self.keys.load_key_set()).await
    }

    async fn save_keys(&self, keys: &QuantumKeySet) -> RegistryResult<()> {
        self.timed("key set save", self.keys.save_key_set(keys)).await
    }

    async fn write_encrypted(&self, registry: &Registry, keys: &QuantumKeySet) -> RegistryResult<()> {
        let plaintext = zeroize::Zeroizing::new(registry.to_json_bytes()?);
        let blob = self
            .cipher
            .encrypt(&plaintext, keys)
            .map_err(|e| self.crypto_failure("encrypt", e))?
            .into_bytes();

        let metadata = BlobMetadata::for_bytes(&blob, "text/plain", "v2");
        let size = blob.len();
        self.timed("registry set", self.blobs.set(&self.registry_key, blob, metadata))
            .await?;

        debug!("saved registry ({size} bytes, {} tenants)", registry.len());
        audit::emit(
            &self.audit,
            audit::EVENT_REGISTRY_SAVED,
            json!({ "format": "v2", "tenants": registry.len() }),
        );
        Ok(())
    }

    /// Decides whether a read that skipped decryption is acceptable.
    fn check_downgrade(&self, format: CiphertextFormat) -> RegistryResult<()> {
        match (self.mode, format.is_encrypted()) {
            (DeploymentMode::Production, true) => Err(RegistryError::KeysUnavailable(format!(
                "{format} registry blob requires the legacy key"
            ))),
            (DeploymentMode::Production, false) => {
                warn!("registry read as unencrypted {format}; next save will encrypt it");
                audit::emit(
                    &self.audit,
                    audit::EVENT_DOWNGRADED_READ,
                    json!({ "format": format.to_string() }),
                );
                Ok(())
            }
            (DeploymentMode::Local, _) => {
                debug!("registry read as {format} without decryption (local mode)");
                Ok(())
            }
        }
    }

    fn crypto_failure(&self, op: &str, e: CryptoError) -> RegistryError {
        warn!("registry {op} failed: {e}");
        RegistryError::from(e)
    }

    async fn timed<T>(
        &self,
        op: &str,
        fut: impl Future<Output = RegistryResult<T>>,
    ) -> RegistryResult<T> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            RegistryError::UpstreamUnavailable(format!("{op} timed out after {:?}", self.timeout))
        })?
    }
}
