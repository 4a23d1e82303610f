//! XOR combination of the AES content key with the KEM shared secret.
//!
//! `protected = content_key XOR shared_secret[0..32]`. XOR is only a sound
//! combiner while both operands are fresh, independent, uniformly random
//! secrets, so the checks below refuse anything that is visibly not: short
//! secrets, all-zero operands, and identical operands (which would cancel to
//! zero). Replacing XOR with a KDF requires a new wire version.

use crate::error::{CryptoError, CryptoResult};
use crate::sensitive::{KEY_SIZE, SensitiveBytes32};

/// Combines `key` with the first 32 bytes of `shared_secret`.
///
/// The operation is its own inverse, so the same function recovers the
/// content key from the protected key on decryption.
pub fn xor_combine(key: &SensitiveBytes32, shared_secret: &[u8]) -> CryptoResult<SensitiveBytes32> {
    let Some(secret) = shared_secret.get(..KEY_SIZE) else {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "shared secret must be at least {KEY_SIZE} bytes, got {}",
            shared_secret.len()
        )));
    };

    if is_all_zero(key.as_bytes()) || is_all_zero(secret) {
        return Err(CryptoError::InvalidKeyMaterial(
            "refusing to combine an all-zero operand".to_string(),
        ));
    }
    if key.as_bytes().as_slice() == secret {
        return Err(CryptoError::InvalidKeyMaterial(
            "refusing to combine identical operands".to_string(),
        ));
    }

    let mut out = [0u8; KEY_SIZE];
    for (o, (a, b)) in out.iter_mut().zip(key.as_bytes().iter().zip(secret)) {
        *o = a ^ b;
    }
    Ok(SensitiveBytes32::new(out))
}

fn is_all_zero(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, b| acc | b) == 0
}
