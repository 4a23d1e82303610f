//! Encryption layer for the lodge registry.
//!
//! Protects the tenant registry at rest with a hybrid construction:
//! - ML-KEM-768 for post-quantum key encapsulation
//! - RSA-OAEP (SHA-256) as an independent classical wrapping layer
//! - AES-256-GCM for authenticated encryption of the payload
//!
//! # Architecture
//!
//! Each registry write uses a fresh random content key. That key is combined
//! with a fresh KEM shared secret and the result is RSA-wrapped, so an
//! attacker has to break both asymmetric layers to read the registry.
//!
//! The long-term KEM and RSA private keys are themselves sealed under a
//! 32-byte master key ([`envelope`]) that lives outside the blob store.
//!
//! Only [`HybridRegistryCipher`] produces or parses the versioned wire
//! format; only [`envelope`] touches master-key-protected material.

pub mod cipher;
mod combiner;
pub mod envelope;
mod error;
pub mod hybrid;
pub mod kem;
pub mod keyset;
pub mod rsa_wrap;
mod sensitive;
pub mod versioned;

pub use envelope::{
    open_private_halves, reseal_envelope, seal_private_halves, EncryptedKeyEnvelope,
};
pub use error::{CryptoError, CryptoResult};
pub use hybrid::{HybridRegistryCipher, Opened};
pub use keyset::{KemKeyPair, PrivateHalves, PublicKeyConfig, QuantumKeySet, RsaKeyPair};
pub use sensitive::{KEY_SIZE, MasterKey, SensitiveBytes32};
pub use versioned::CiphertextFormat;
