//! Registry data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Where this process runs. Passed explicitly to every constructor that
/// behaves differently in development; never read from the environment
/// below the config layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Developer machine: cleartext key files and plaintext saves allowed.
    Local,
    #[default]
    Production,
}

impl DeploymentMode {
    pub fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Production => f.write_str("production"),
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "development" | "dev" => Ok(Self::Local),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown deployment mode: {other}")),
        }
    }
}

/// One tenant's configuration: arbitrary structured fields, credentials included.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantRecord(serde_json::Map<String, serde_json::Value>);

impl TenantRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Display name, when the record carries one.
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(|v| v.as_str())
    }
}

/// Tenant identifier to record. Identifiers are unique; order carries no meaning.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry(BTreeMap<String, TenantRecord>);

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: &str) -> Option<&TenantRecord> {
        self.0.get(tenant_id)
    }

    /// Inserts or replaces a tenant, returning the previous record.
    pub fn upsert(&mut self, tenant_id: impl Into<String>, record: TenantRecord) -> Option<TenantRecord> {
        self.0.insert(tenant_id.into(), record)
    }

    pub fn remove(&mut self, tenant_id: &str) -> Option<TenantRecord> {
        self.0.remove(tenant_id)
    }

    pub fn tenant_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Metadata written alongside a blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub content_type: String,
    /// SHA-256 of the stored bytes (ciphertext when encrypted).
    pub content_hash: String,
    /// `v2`, `plaintext`, or `key-envelope`.
    pub format: String,
    pub written_at: DateTime<Utc>,
}

impl BlobMetadata {
    pub fn for_bytes(data: &[u8], content_type: &str, format: &str) -> Self {
        use sha2::{Digest, Sha256};
        Self {
            content_type: content_type.to_string(),
            content_hash: hex::encode(Sha256::digest(data)),
            format: format.to_string(),
            written_at: Utc::now(),
        }
    }
}
