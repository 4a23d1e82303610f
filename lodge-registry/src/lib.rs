//! Encrypted persistence for the lodge tenant registry.
//!
//! Provides:
//! - Load/save of the registry through any [`BlobStore`] (S3, filesystem, memory)
//! - Key material from a master-key-sealed envelope, or cleartext files in local mode
//! - Production/local downgrade policy for legacy and plaintext blobs
//! - Key rotation and a time-boxed read cache
//! - A best-effort audit trail

pub mod audit;
pub mod blob_store;
pub mod cache;
pub mod config;
pub mod error;
pub mod key_source;
pub mod s3_store;
pub mod store;
pub mod types;

pub use blob_store::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use key_source::{CachedKeySource, EncryptedEnvelopeKeySource, KeySource, LocalFileKeySource};
pub use store::RegistryStore;
pub use types::*;
