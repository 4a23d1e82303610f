//! Hybrid registry cipher: ML-KEM-768 + RSA-OAEP + AES-256-GCM.
//!
//! Encryption:
//! 1. Fresh random content key `K`; AES-256-GCM the payload under `K` with a
//!    fresh 16-byte IV.
//! 2. Encapsulate against the KEM public key -> `(kem_ct, ss)`.
//! 3. `protected = K XOR ss[0..32]`.
//! 4. RSA-OAEP wrap `protected` (always 32 bytes). The KEM ciphertext travels
//!    unwrapped; it is not secret and is too large for RSA.
//!
//! Recovering `K` therefore needs both the KEM and the RSA private keys.

use crate::cipher::{self, IvLength};
use crate::combiner::xor_combine;
use crate::error::{CryptoError, CryptoResult};
use crate::keyset::QuantumKeySet;
use crate::sensitive::SensitiveBytes32;
use crate::versioned::{CiphertextFormat, HybridFields, VersionedCiphertext};
use crate::{kem, rsa_wrap};
use tracing::debug;

/// Result of opening a stored blob.
#[derive(Debug)]
pub struct Opened {
    pub format: CiphertextFormat,
    pub plaintext: Vec<u8>,
    /// False when the blob was passed through without decryption (plaintext,
    /// or a legacy blob with no legacy key configured).
    pub decrypted: bool,
}

/// Owns the registry ciphertext format.
#[derive(Clone, Debug, Default)]
pub struct HybridRegistryCipher {
    legacy_key: Option<SensitiveBytes32>,
}

impl HybridRegistryCipher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the static AES key used by `v1` and unprefixed legacy blobs.
    pub fn with_legacy_key(mut self, key: SensitiveBytes32) -> Self {
        self.legacy_key = Some(key);
        self
    }

    pub fn has_legacy_key(&self) -> bool {
        self.legacy_key.is_some()
    }

    /// Encrypts `plaintext` into a `v2:` string.
    pub fn encrypt(&self, plaintext: &[u8], keys: &QuantumKeySet) -> CryptoResult<String> {
        let content_key = SensitiveBytes32::random();
        let payload = cipher::encrypt(content_key.as_bytes(), plaintext, IvLength::Wide)?;

        let encap = kem::encapsulate(&keys.kem.public_key)?;
        let protected_key = xor_combine(&content_key, &encap.shared_secret)?;
        let rsa_wrapped_key = rsa_wrap::wrap(&keys.rsa.public_key, &protected_key)?;

        debug!(
            "encrypted registry payload: {} bytes plaintext, {} bytes KEM ciphertext",
            plaintext.len(),
            encap.ciphertext.len()
        );

        Ok(VersionedCiphertext::encode_v2(&HybridFields {
            kem_ciphertext: encap.ciphertext,
            rsa_wrapped_key,
            payload,
        }))
    }

    /// Decrypts any supported format with the given key set.
    pub fn decrypt(&self, input: &str, keys: &QuantumKeySet) -> CryptoResult<Vec<u8>> {
        self.open(input, Some(keys)).map(|opened| opened.plaintext)
    }

    /// Decrypts with optional keys, reporting which format was handled.
    ///
    /// A `v2` blob without keys is `KeysUnavailable`. Legacy blobs use the
    /// legacy key when present and pass through unchanged otherwise.
    pub fn open(&self, input: &str, keys: Option<&QuantumKeySet>) -> CryptoResult<Opened> {
        let parsed = VersionedCiphertext::parse(input)?;
        let format = parsed.format();

        let (plaintext, decrypted) = match parsed {
            VersionedCiphertext::HybridV2(fields) => {
                let keys = keys.ok_or_else(|| {
                    CryptoError::KeysUnavailable("v2 registry blob requires the quantum key set".to_string())
                })?;
                (open_hybrid(&fields, keys)?, true)
            }
            VersionedCiphertext::LegacyV1(payload)
            | VersionedCiphertext::LegacyUnprefixed(payload) => match &self.legacy_key {
                Some(key) => (cipher::decrypt(key.as_bytes(), &payload)?, true),
                None => (input.as_bytes().to_vec(), false),
            },
            VersionedCiphertext::Plaintext(bytes) => (bytes, false),
        };

        debug!("opened {format} registry blob ({} bytes)", plaintext.len());
        Ok(Opened {
            format,
            plaintext,
            decrypted,
        })
    }

    /// Re-encrypts a blob from `old` keys to `new` keys as `v2`.
    pub fn reencrypt(
        &self,
        input: &str,
        old: &QuantumKeySet,
        new: &QuantumKeySet,
    ) -> CryptoResult<String> {
        let plaintext = zeroize::Zeroizing::new(self.decrypt(input, old)?);
        self.encrypt(&plaintext, new)
    }
}

fn open_hybrid(fields: &HybridFields, keys: &QuantumKeySet) -> CryptoResult<Vec<u8>> {
    let protected_key = rsa_wrap::unwrap(keys.rsa.private_key(), &fields.rsa_wrapped_key)?;
    let shared_secret = kem::decapsulate(keys.kem.private_key(), &fields.kem_ciphertext)?;
    let content_key = xor_combine(&protected_key, &shared_secret)
        .map_err(|_| CryptoError::AuthenticationFailure)?;
    cipher::decrypt(content_key.as_bytes(), &fields.payload)
}
