//! Error types for the registry encryption layer.

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors produced while composing the KEM, RSA and AEAD layers.
///
/// `AuthenticationFailure` carries no detail: a wrong key and a tampered
/// ciphertext are indistinguishable to the caller.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key material unavailable: {0}")]
    KeysUnavailable(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("authentication failed")]
    AuthenticationFailure,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CryptoError {
    /// Invalid master key length, surfaced as key-material error.
    pub fn invalid_master_key_length(actual: usize) -> Self {
        Self::InvalidKeyMaterial(format!(
            "master key must be exactly 32 bytes, got {actual}"
        ))
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
