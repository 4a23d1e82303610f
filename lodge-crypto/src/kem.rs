//! ML-KEM-768 key encapsulation.
//!
//! Thin adapter over `pqcrypto-mlkem`: byte slices in, byte vectors out.
//! Malformed keys surface as `InvalidKeyMaterial`.

use crate::error::{CryptoError, CryptoResult};
use crate::sensitive::KEY_SIZE;
use pqcrypto_mlkem::mlkem768;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use zeroize::Zeroizing;

pub fn public_key_size() -> usize {
    mlkem768::public_key_bytes()
}

pub fn secret_key_size() -> usize {
    mlkem768::secret_key_bytes()
}

pub fn ciphertext_size() -> usize {
    mlkem768::ciphertext_bytes()
}

/// Result of encapsulating against a public key.
pub struct Encapsulation {
    /// Sent in the clear alongside the wrapped key; not secret.
    pub ciphertext: Vec<u8>,
    pub shared_secret: Zeroizing<Vec<u8>>,
}

/// Generates a fresh `(public, secret)` key pair.
pub fn generate_keypair() -> (Vec<u8>, Zeroizing<Vec<u8>>) {
    let (pk, sk) = mlkem768::keypair();
    (pk.as_bytes().to_vec(), Zeroizing::new(sk.as_bytes().to_vec()))
}

/// Checks that `public_key` has the shape of an ML-KEM-768 public key.
pub fn validate_public_key(public_key: &[u8]) -> CryptoResult<()> {
    mlkem768::PublicKey::from_bytes(public_key)
        .map(|_| ())
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("ML-KEM-768 public key: {e:?}")))
}

/// Encapsulates against `public_key`, producing a ciphertext and a shared secret
/// of at least [`KEY_SIZE`] bytes.
pub fn encapsulate(public_key: &[u8]) -> CryptoResult<Encapsulation> {
    let pk = mlkem768::PublicKey::from_bytes(public_key)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("ML-KEM-768 public key: {e:?}")))?;
    let (ss, ct) = mlkem768::encapsulate(&pk);

    let shared_secret = Zeroizing::new(ss.as_bytes().to_vec());
    if shared_secret.len() < KEY_SIZE {
        return Err(CryptoError::Encryption(format!(
            "KEM shared secret too short: {} bytes",
            shared_secret.len()
        )));
    }

    Ok(Encapsulation {
        ciphertext: ct.as_bytes().to_vec(),
        shared_secret,
    })
}

/// Recovers the shared secret for `ciphertext` with `secret_key`.
///
/// ML-KEM uses implicit rejection: a tampered ciphertext yields an unrelated
/// secret rather than an error, which the AEAD layer then rejects.
pub fn decapsulate(secret_key: &[u8], ciphertext: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let sk = mlkem768::SecretKey::from_bytes(secret_key)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("ML-KEM-768 secret key: {e:?}")))?;
    let ct = mlkem768::Ciphertext::from_bytes(ciphertext)
        .map_err(|e| CryptoError::MalformedCiphertext(format!("ML-KEM-768 ciphertext: {e:?}")))?;

    let ss = mlkem768::decapsulate(&ct, &sk);
    Ok(Zeroizing::new(ss.as_bytes().to_vec()))
}
