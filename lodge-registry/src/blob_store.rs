//! Key-value blob storage contract and the non-S3 implementations.
//!
//! `get` distinguishes "not found" (`Ok(None)`) from a transient failure
//! (`Err(UpstreamUnavailable)`); callers rely on that to decide whether an
//! empty registry is a legitimate first run.

use crate::error::{RegistryError, RegistryResult};
use crate::types::BlobMetadata;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, data: Vec<u8>, metadata: BlobMetadata) -> RegistryResult<()>;
}

/// In-process store for tests and single-process tooling.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, (Vec<u8>, BlobMetadata)>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata recorded with the last write to `key`.
    pub async fn metadata(&self, key: &str) -> Option<BlobMetadata> {
        self.blobs.read().await.get(key).map(|(_, m)| m.clone())
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).map(|(data, _)| data.clone()))
    }

    async fn set(&self, key: &str, data: Vec<u8>, metadata: BlobMetadata) -> RegistryResult<()> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), (data, metadata));
        Ok(())
    }
}

/// Filesystem-backed store; blob keys map to relative paths under `root`.
///
/// Used for the local development registry. Metadata is written next to the
/// blob as `<name>.meta.json`.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> RegistryResult<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(RegistryError::Config(format!("invalid blob key: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::UpstreamUnavailable(format!(
                "read {} failed: {e}",
                path.display()
            ))),
        }
    }

    async fn set(&self, key: &str, data: Vec<u8>, metadata: BlobMetadata) -> RegistryResult<()> {
        let path = self.path_for(key)?;
        let unavailable =
            |e: std::io::Error| RegistryError::UpstreamUnavailable(format!("write {} failed: {e}", path.display()));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(unavailable)?;
        }

        // Readers never see a half-written blob.
        let tmp = path.with_extension("tmp");
        let size = data.len();
        tokio::fs::write(&tmp, data).await.map_err(unavailable)?;
        tokio::fs::rename(&tmp, &path).await.map_err(unavailable)?;

        let mut meta_path = path.clone().into_os_string();
        meta_path.push(".meta.json");
        let meta = serde_json::to_vec_pretty(&metadata)?;
        tokio::fs::write(&meta_path, meta).await.map_err(unavailable)?;

        debug!("wrote {size} bytes to {}", path.display());
        Ok(())
    }
}
