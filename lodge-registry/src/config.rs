//! Registry configuration.
//!
//! The only place that reads process environment. Everything downstream
//! receives an explicit [`DeploymentMode`] and decoded key material.

use crate::error::{RegistryError, RegistryResult};
use crate::types::DeploymentMode;
use lodge_crypto::{MasterKey, PublicKeyConfig, SensitiveBytes32};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DEPLOYMENT_MODE: &str = "LODGE_DEPLOYMENT_MODE";
pub const ENV_KEM_PUBLIC_KEY: &str = "LODGE_KEM_PUBLIC_KEY";
pub const ENV_RSA_PUBLIC_KEY: &str = "LODGE_RSA_PUBLIC_KEY";
pub const ENV_MASTER_KEY: &str = "LODGE_MASTER_KEY";
pub const ENV_LEGACY_KEY: &str = "LODGE_LEGACY_KEY";
pub const ENV_S3_BUCKET: &str = "LODGE_S3_BUCKET";
pub const ENV_S3_REGION: &str = "LODGE_S3_REGION";
pub const ENV_S3_ENDPOINT: &str = "LODGE_S3_ENDPOINT";
pub const ENV_REGISTRY_BLOB_KEY: &str = "LODGE_REGISTRY_BLOB_KEY";
pub const ENV_KEY_ENVELOPE_BLOB_KEY: &str = "LODGE_KEY_ENVELOPE_BLOB_KEY";
pub const ENV_LOCAL_DIR: &str = "LODGE_LOCAL_DIR";
pub const ENV_CACHE_TTL_SECS: &str = "LODGE_CACHE_TTL_SECS";
pub const ENV_BLOB_TIMEOUT_SECS: &str = "LODGE_BLOB_TIMEOUT_SECS";

/// Configuration for registry persistence and key loading.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub deployment_mode: DeploymentMode,

    /// ML-KEM-768 public key, hex.
    pub kem_public_key: Option<String>,

    /// RSA public key PEM, base64-encoded.
    pub rsa_public_key: Option<String>,

    /// 32-byte master key, hex. Never serialized.
    #[serde(skip_serializing, default)]
    pub master_key: Option<String>,

    /// Static AES key for `v1`/legacy blobs, hex. Never serialized.
    #[serde(skip_serializing, default)]
    pub legacy_key: Option<String>,

    pub s3_bucket: String,
    pub s3_region: String,

    /// Optional S3 endpoint override (MinIO or other S3-compatible stores).
    pub s3_endpoint_override: Option<String>,

    /// Blob key holding the registry ciphertext.
    pub registry_blob_key: String,

    /// Blob key holding the encrypted private-key envelope.
    pub key_envelope_blob_key: String,

    /// Directory for cleartext key files and the plaintext store in local mode.
    pub local_dir: PathBuf,

    pub cache_ttl_secs: u64,
    pub blob_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            deployment_mode: DeploymentMode::Production,
            kem_public_key: None,
            rsa_public_key: None,
            master_key: None,
            legacy_key: None,
            s3_bucket: "lodge-registry".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint_override: None,
            registry_blob_key: "registry/lodges.enc".to_string(),
            key_envelope_blob_key: "registry/quantum-keys.enc".to_string(),
            local_dir: PathBuf::from(".lodge"),
            cache_ttl_secs: 300, // 5 minutes
            blob_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("deployment_mode", &self.deployment_mode)
            .field("kem_public_key", &self.kem_public_key.as_ref().map(|_| "<set>"))
            .field("rsa_public_key", &self.rsa_public_key.as_ref().map(|_| "<set>"))
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("legacy_key", &self.legacy_key.as_ref().map(|_| "<redacted>"))
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint_override", &self.s3_endpoint_override)
            .field("registry_blob_key", &self.registry_blob_key)
            .field("key_envelope_blob_key", &self.key_envelope_blob_key)
            .field("local_dir", &self.local_dir)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("blob_timeout_secs", &self.blob_timeout_secs)
            .finish()
    }
}

impl RegistryConfig {
    /// Builds a config from `LODGE_*` environment variables over the defaults.
    pub fn from_env() -> RegistryResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RegistryResult<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(mode) = get(ENV_DEPLOYMENT_MODE) {
            config.deployment_mode = mode.parse().map_err(RegistryError::Config)?;
        }
        config.kem_public_key = get(ENV_KEM_PUBLIC_KEY);
        config.rsa_public_key = get(ENV_RSA_PUBLIC_KEY);
        config.master_key = get(ENV_MASTER_KEY);
        config.legacy_key = get(ENV_LEGACY_KEY);

        if let Some(bucket) = get(ENV_S3_BUCKET) {
            config.s3_bucket = bucket;
        }
        if let Some(region) = get(ENV_S3_REGION) {
            config.s3_region = region;
        }
        config.s3_endpoint_override = get(ENV_S3_ENDPOINT);
        if let Some(key) = get(ENV_REGISTRY_BLOB_KEY) {
            config.registry_blob_key = key;
        }
        if let Some(key) = get(ENV_KEY_ENVELOPE_BLOB_KEY) {
            config.key_envelope_blob_key = key;
        }
        if let Some(dir) = get(ENV_LOCAL_DIR) {
            config.local_dir = PathBuf::from(dir);
        }
        if let Some(ttl) = get(ENV_CACHE_TTL_SECS) {
            config.cache_ttl_secs = parse_secs(ENV_CACHE_TTL_SECS, &ttl)?;
        }
        if let Some(timeout) = get(ENV_BLOB_TIMEOUT_SECS) {
            config.blob_timeout_secs = parse_secs(ENV_BLOB_TIMEOUT_SECS, &timeout)?;
        }

        Ok(config)
    }

    /// Public halves, if both are configured.
    pub fn public_keys(&self) -> Option<PublicKeyConfig> {
        Some(PublicKeyConfig {
            kem_public_key: self.kem_public_key.clone()?,
            rsa_public_key: self.rsa_public_key.clone()?,
        })
    }

    /// Decoded master key. A configured but malformed key is an error, never `None`.
    pub fn master_key(&self) -> RegistryResult<Option<MasterKey>> {
        self.master_key
            .as_deref()
            .map(MasterKey::from_hex)
            .transpose()
            .map_err(RegistryError::from)
    }

    /// Decoded legacy AES key.
    pub fn legacy_key(&self) -> RegistryResult<Option<SensitiveBytes32>> {
        let Some(encoded) = self.legacy_key.as_deref() else {
            return Ok(None);
        };
        let key = MasterKey::from_hex(encoded)?;
        Ok(Some(SensitiveBytes32::new(*key.as_bytes())))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn blob_timeout(&self) -> Duration {
        Duration::from_secs(self.blob_timeout_secs)
    }
}

fn parse_secs(name: &str, value: &str) -> RegistryResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| RegistryError::Config(format!("{name} must be whole seconds: {e}")))
}
