//! Master-key protection for the private halves of a key set.
//!
//! The private halves are serialized as a JSON record and sealed with
//! AES-256-GCM (12-byte IV) under the 32-byte [`MasterKey`]. The envelope is
//! undecryptable without that exact key and any tampering fails the tag check.

use crate::cipher::{self, IvLength, SealedPayload, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::keyset::PrivateHalves;
use crate::sensitive::MasterKey;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

pub const ENVELOPE_IV_SIZE: usize = 12;

/// Sealed private halves, stored in the blob store as JSON with hex fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedKeyEnvelope {
    #[serde(with = "hex::serde")]
    pub iv: [u8; ENVELOPE_IV_SIZE],
    #[serde(with = "hex::serde")]
    pub auth_tag: [u8; TAG_SIZE],
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedKeyEnvelope {
    pub fn to_bytes(&self) -> CryptoResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CryptoError::MalformedCiphertext(format!("key envelope: {e}")))
    }
}

/// Seals `private` under `master_key`.
///
/// Takes the raw key bytes so that a wrong-length secret straight from
/// configuration is rejected here rather than coerced.
pub fn seal_private_halves(
    private: &PrivateHalves,
    master_key: &[u8],
) -> CryptoResult<EncryptedKeyEnvelope> {
    let master_key = MasterKey::from_slice(master_key)?;
    let plaintext = Zeroizing::new(serde_json::to_vec(private)?);

    let sealed = cipher::encrypt(master_key.as_bytes(), &plaintext, IvLength::Standard)?;
    let iv: [u8; ENVELOPE_IV_SIZE] = sealed
        .iv
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::Encryption("envelope IV has wrong length".to_string()))?;

    debug!("sealed key envelope ({} bytes)", sealed.ciphertext.len());
    Ok(EncryptedKeyEnvelope {
        iv,
        auth_tag: sealed.auth_tag,
        ciphertext: sealed.ciphertext,
    })
}

/// Opens an envelope. A wrong master key or tampered envelope is always
/// `AuthenticationFailure`; corrupted-but-parseable key material is never returned.
pub fn open_private_halves(
    envelope: &EncryptedKeyEnvelope,
    master_key: &MasterKey,
) -> CryptoResult<PrivateHalves> {
    let payload = SealedPayload {
        iv: envelope.iv.to_vec(),
        auth_tag: envelope.auth_tag,
        ciphertext: envelope.ciphertext.clone(),
    };
    let plaintext = Zeroizing::new(cipher::decrypt(master_key.as_bytes(), &payload)?);

    serde_json::from_slice(&plaintext)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("key envelope contents: {e}")))
}

/// Re-seals an envelope under a new master key without changing the key set.
pub fn reseal_envelope(
    envelope: &EncryptedKeyEnvelope,
    old_master_key: &MasterKey,
    new_master_key: &MasterKey,
) -> CryptoResult<EncryptedKeyEnvelope> {
    let private = open_private_halves(envelope, old_master_key)?;
    seal_private_halves(&private, new_master_key.as_bytes())
}
