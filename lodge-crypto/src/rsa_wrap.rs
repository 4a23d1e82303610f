//! RSA-OAEP (SHA-256) wrapping of the 32-byte protected key.
//!
//! Only ever wraps exactly [`WRAP_INPUT_SIZE`] bytes, which fits any RSA key of
//! 2048 bits or more regardless of how large the KEM ciphertext is.

use crate::error::{CryptoError, CryptoResult};
use crate::sensitive::{KEY_SIZE, SensitiveBytes32};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

pub const WRAP_INPUT_SIZE: usize = KEY_SIZE;

/// Modulus size for newly generated deployment keys.
pub const DEFAULT_RSA_BITS: usize = 4096;

/// Smallest modulus accepted for wrapping.
pub const MIN_RSA_BITS: usize = 2048;

/// Generates a key pair and returns `(SPKI public PEM, PKCS#8 private PEM)`.
pub fn generate_keypair(bits: usize) -> CryptoResult<(String, Zeroizing<String>)> {
    if bits < MIN_RSA_BITS {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "RSA modulus of {bits} bits is below the {MIN_RSA_BITS}-bit minimum"
        )));
    }
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::Encryption(format!("RSA key generation failed: {e}")))?;
    let public = RsaPublicKey::from(&private);

    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::Serialization(format!("RSA public key PEM: {e}")))?;
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CryptoError::Serialization(format!("RSA private key PEM: {e}")))?;

    Ok((public_pem, private_pem))
}

/// Parses an SPKI or PKCS#1 public key PEM.
pub fn parse_public_key(pem: &str) -> CryptoResult<RsaPublicKey> {
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("RSA public key: {e}")))?;
    if key.size() * 8 < MIN_RSA_BITS {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "RSA public key is {} bits, minimum is {MIN_RSA_BITS}",
            key.size() * 8
        )));
    }
    Ok(key)
}

/// Parses a PKCS#8 or PKCS#1 private key PEM.
pub fn parse_private_key(pem: &str) -> CryptoResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("RSA private key: {e}")))
}

/// OAEP-encrypts the 32-byte protected key.
pub fn wrap(public_pem: &str, protected_key: &SensitiveBytes32) -> CryptoResult<Vec<u8>> {
    let public = parse_public_key(public_pem)?;
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), protected_key.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("RSA-OAEP wrap failed: {e}")))
}

/// Recovers the protected key. A wrong key, tampered blob, or unexpected length
/// all collapse into `AuthenticationFailure`.
pub fn unwrap(private_pem: &str, wrapped: &[u8]) -> CryptoResult<SensitiveBytes32> {
    let private = parse_private_key(private_pem)?;
    let recovered = Zeroizing::new(
        private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| CryptoError::AuthenticationFailure)?,
    );
    SensitiveBytes32::from_slice(&recovered).ok_or(CryptoError::AuthenticationFailure)
}
