//! Registry persistence error types.

use lodge_crypto::CryptoError;
use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Message shown to anyone outside the trust boundary that holds the keys.
pub const UNAVAILABLE_MESSAGE: &str = "registry temporarily unavailable";

/// Errors that can occur while loading or saving the registry.
///
/// `Crypto` renders as the opaque [`UNAVAILABLE_MESSAGE`]; the underlying
/// detail is only reachable through `source()`.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry temporarily unavailable")]
    Crypto(#[source] CryptoError),

    #[error("encryption keys unavailable: {0}")]
    KeysUnavailable(String),

    #[error("blob store unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Only store-level failures are worth retrying; a failed tag check never
    /// becomes a successful one.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }

    /// Message safe to hand to untrusted callers.
    pub fn public_message(&self) -> &'static str {
        UNAVAILABLE_MESSAGE
    }
}

impl From<CryptoError> for RegistryError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KeysUnavailable(msg) => Self::KeysUnavailable(msg),
            other => Self::Crypto(other),
        }
    }
}
