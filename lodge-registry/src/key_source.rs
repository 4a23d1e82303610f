//! Where the hybrid cipher's key material comes from.
//!
//! Two sources exist: the production [`EncryptedEnvelopeKeySource`] (public
//! halves from configuration, private halves from a master-key-sealed blob)
//! and the development-only [`LocalFileKeySource`] (cleartext files).
//! Envelopes also seal the public halves; when configuration lags behind a
//! rotation those win over the configured ones.
//! [`CachedKeySource`] wraps either one for the lifetime of the process.

use crate::blob_store::BlobStore;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::types::{BlobMetadata, DeploymentMode};
use async_trait::async_trait;
use lodge_crypto::{
    EncryptedKeyEnvelope, KemKeyPair, MasterKey, PublicKeyConfig, QuantumKeySet, RsaKeyPair,
    open_private_halves, seal_private_halves,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[async_trait]
pub trait KeySource: Send + Sync {
    /// Loads the key set. `Ok(None)` means "encryption unavailable", not failure.
    async fn load_key_set(&self) -> RegistryResult<Option<Arc<QuantumKeySet>>>;

    /// Persists the private halves of `keys` in this source's storage.
    async fn save_key_set(&self, keys: &QuantumKeySet) -> RegistryResult<()>;
}

/// Public halves from configuration, private halves from a sealed envelope.
pub struct EncryptedEnvelopeKeySource {
    public: Option<PublicKeyConfig>,
    master_key: Option<MasterKey>,
    blobs: Arc<dyn BlobStore>,
    envelope_key: String,
}

impl EncryptedEnvelopeKeySource {
    pub fn new(
        public: Option<PublicKeyConfig>,
        master_key: Option<MasterKey>,
        blobs: Arc<dyn BlobStore>,
        envelope_key: impl Into<String>,
    ) -> Self {
        Self {
            public,
            master_key,
            blobs,
            envelope_key: envelope_key.into(),
        }
    }

    pub fn from_config(config: &RegistryConfig, blobs: Arc<dyn BlobStore>) -> RegistryResult<Self> {
        Ok(Self::new(
            config.public_keys(),
            config.master_key()?,
            blobs,
            config.key_envelope_blob_key.clone(),
        ))
    }
}

#[async_trait]
impl KeySource for EncryptedEnvelopeKeySource {
    async fn load_key_set(&self) -> RegistryResult<Option<Arc<QuantumKeySet>>> {
        let (Some(public), Some(master_key)) = (&self.public, &self.master_key) else {
            debug!("quantum keys not configured; encryption unavailable");
            return Ok(None);
        };

        let Some(bytes) = self.blobs.get(&self.envelope_key).await? else {
            warn!("key envelope {} not found; encryption unavailable", self.envelope_key);
            return Ok(None);
        };

        let envelope = EncryptedKeyEnvelope::from_bytes(&bytes)?;
        let private = open_private_halves(&envelope, master_key)?;
        let (public, stale) = private.effective_public_keys(public)?;
        if stale {
            warn!(
                "configured public keys do not match key envelope {}; using the sealed public halves",
                self.envelope_key
            );
        }
        let keys = QuantumKeySet::from_halves(public, &private)?;
        keys.verify_consistency()?;

        info!("loaded quantum key set from envelope {}", self.envelope_key);
        Ok(Some(Arc::new(keys)))
    }

    async fn save_key_set(&self, keys: &QuantumKeySet) -> RegistryResult<()> {
        let master_key = self.master_key.as_ref().ok_or_else(|| {
            RegistryError::KeysUnavailable("no master key configured to seal the key envelope".to_string())
        })?;

        let envelope = seal_private_halves(&keys.private_halves(), master_key.as_bytes())?;
        let bytes = envelope.to_bytes()?;
        let metadata = BlobMetadata::for_bytes(&bytes, "application/json", "key-envelope");
        self.blobs.set(&self.envelope_key, bytes, metadata).await?;

        info!("saved key envelope to {}", self.envelope_key);
        Ok(())
    }
}

const KEM_PUBLIC_FILE: &str = "kem_public.hex";
const KEM_PRIVATE_FILE: &str = "kem_private.hex";
const RSA_PUBLIC_FILE: &str = "rsa_public.pem";
const RSA_PRIVATE_FILE: &str = "rsa_private.pem";

/// Cleartext key files for development. Cannot be constructed outside
/// [`DeploymentMode::Local`].
#[derive(Debug)]
pub struct LocalFileKeySource {
    dir: PathBuf,
}

impl LocalFileKeySource {
    pub fn new(mode: DeploymentMode, dir: impl Into<PathBuf>) -> RegistryResult<Self> {
        if !mode.is_local() {
            return Err(RegistryError::Config(format!(
                "cleartext key files are only allowed in local mode, not {mode}"
            )));
        }
        Ok(Self { dir: dir.into() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_optional(&self, name: &str) -> RegistryResult<Option<String>> {
        match tokio::fs::read_to_string(self.dir.join(name)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeySource for LocalFileKeySource {
    async fn load_key_set(&self) -> RegistryResult<Option<Arc<QuantumKeySet>>> {
        let (Some(kem_public), Some(kem_private), Some(rsa_public), Some(rsa_private)) = (
            self.read_optional(KEM_PUBLIC_FILE).await?,
            self.read_optional(KEM_PRIVATE_FILE).await?,
            self.read_optional(RSA_PUBLIC_FILE).await?,
            self.read_optional(RSA_PRIVATE_FILE).await?,
        ) else {
            debug!("no local key files in {}", self.dir.display());
            return Ok(None);
        };

        let kem_public = hex::decode(kem_public.trim()).map_err(|e| {
            RegistryError::Config(format!("{KEM_PUBLIC_FILE} is not hex: {e}"))
        })?;
        let kem_private = hex::decode(kem_private.trim()).map_err(|e| {
            RegistryError::Config(format!("{KEM_PRIVATE_FILE} is not hex: {e}"))
        })?;

        let keys = QuantumKeySet {
            kem: KemKeyPair::from_parts(kem_public, kem_private)?,
            rsa: RsaKeyPair::from_parts(rsa_public, rsa_private)?,
        };
        debug!("loaded cleartext key files from {}", self.dir.display());
        Ok(Some(Arc::new(keys)))
    }

    async fn save_key_set(&self, keys: &QuantumKeySet) -> RegistryResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let private = keys.private_halves();

        tokio::fs::write(self.dir.join(KEM_PUBLIC_FILE), hex::encode(&keys.kem.public_key)).await?;
        tokio::fs::write(self.dir.join(KEM_PRIVATE_FILE), &private.kem_private_key).await?;
        tokio::fs::write(self.dir.join(RSA_PUBLIC_FILE), &keys.rsa.public_key).await?;
        tokio::fs::write(self.dir.join(RSA_PRIVATE_FILE), &private.rsa_private_key).await?;

        warn!("wrote cleartext key files to {}", self.dir.display());
        Ok(())
    }
}

/// Loads key material once and serves it for the life of the process.
///
/// Absence is not cached: until keys are found every load goes to the inner
/// source, so an envelope provisioned after startup is picked up.
pub struct CachedKeySource<S> {
    inner: S,
    cached: RwLock<Option<Arc<QuantumKeySet>>>,
}

impl<S: KeySource> CachedKeySource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cached: RwLock::new(None),
        }
    }

    /// Drops the cached result so the next load goes to the inner source.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

#[async_trait]
impl<S: KeySource> KeySource for CachedKeySource<S> {
    async fn load_key_set(&self) -> RegistryResult<Option<Arc<QuantumKeySet>>> {
        // Fast path
        if let Some(ref cached) = *self.cached.read().await {
            return Ok(Some(cached.clone()));
        }

        // Slow path: re-check under the write lock so concurrent callers load once
        let mut slot = self.cached.write().await;
        if let Some(ref cached) = *slot {
            return Ok(Some(cached.clone()));
        }
        let loaded = self.inner.load_key_set().await?;
        *slot = loaded.clone();
        Ok(loaded)
    }

    async fn save_key_set(&self, keys: &QuantumKeySet) -> RegistryResult<()> {
        self.inner.save_key_set(keys).await?;
        *self.cached.write().await = Some(Arc::new(keys.clone()));
        Ok(())
    }
}
