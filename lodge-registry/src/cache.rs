//! Time-boxed cache of the decrypted registry.
//!
//! Readers may see a registry up to one TTL old. There is no coherence
//! beyond that: concurrent writers race and the last write wins.

use crate::types::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    registry: Arc<Registry>,
    loaded_at: Instant,
}

pub struct RegistryCache {
    ttl: Duration,
    entry: RwLock<Option<Entry>>,
}

impl RegistryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached registry, if one was stored less than a TTL ago.
    pub async fn get(&self) -> Option<Arc<Registry>> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| e.loaded_at.elapsed() < self.ttl)
            .map(|e| e.registry.clone())
    }

    pub async fn put(&self, registry: Registry) -> Arc<Registry> {
        let registry = Arc::new(registry);
        *self.entry.write().await = Some(Entry {
            registry: registry.clone(),
            loaded_at: Instant::now(),
        });
        registry
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}
