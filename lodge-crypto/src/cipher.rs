//! AES-256-GCM with a detached authentication tag.
//!
//! The key envelope uses the standard 12-byte nonce; registry ciphertexts
//! (`v1`/`v2`) carry a 16-byte IV, which GCM accepts through its GHASH-derived
//! counter block. The IV length travels with the payload so decryption picks
//! the right instantiation on its own.

use crate::error::{CryptoError, CryptoResult};
use crate::sensitive::KEY_SIZE;
use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::RngCore;
use rand::rngs::OsRng;

pub const TAG_SIZE: usize = 16;

type Aes256Gcm96 = AesGcm<Aes256, U12>;
type Aes256Gcm128 = AesGcm<Aes256, U16>;

/// IV length to use for a fresh encryption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IvLength {
    /// 12 bytes, used by the private-key envelope.
    Standard,
    /// 16 bytes, used by the registry wire formats.
    Wide,
}

impl IvLength {
    pub const fn size(self) -> usize {
        match self {
            Self::Standard => 12,
            Self::Wide => 16,
        }
    }
}

/// Output of one AES-256-GCM encryption, with the tag split out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedPayload {
    pub iv: Vec<u8>,
    pub auth_tag: [u8; TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypts `plaintext` under `key` with a fresh random IV.
pub fn encrypt(
    key: &[u8; KEY_SIZE],
    plaintext: &[u8],
    iv_length: IvLength,
) -> CryptoResult<SealedPayload> {
    let mut iv = vec![0u8; iv_length.size()];
    OsRng.fill_bytes(&mut iv);

    let mut buffer = plaintext.to_vec();
    let auth_tag = match iv_length {
        IvLength::Standard => seal_in_place::<Aes256Gcm96>(key, &iv, &mut buffer)?,
        IvLength::Wide => seal_in_place::<Aes256Gcm128>(key, &iv, &mut buffer)?,
    };

    Ok(SealedPayload {
        iv,
        auth_tag,
        ciphertext: buffer,
    })
}

/// Decrypts and verifies a payload. Any tag mismatch is `AuthenticationFailure`
/// and no plaintext is returned.
pub fn decrypt(key: &[u8; KEY_SIZE], payload: &SealedPayload) -> CryptoResult<Vec<u8>> {
    let mut buffer = payload.ciphertext.clone();
    match payload.iv.len() {
        12 => open_in_place::<Aes256Gcm96>(key, &payload.iv, &payload.auth_tag, &mut buffer)?,
        16 => open_in_place::<Aes256Gcm128>(key, &payload.iv, &payload.auth_tag, &mut buffer)?,
        other => {
            return Err(CryptoError::MalformedCiphertext(format!(
                "unsupported IV length {other}"
            )));
        }
    }
    Ok(buffer)
}

fn seal_in_place<C: KeyInit + AeadInPlace>(
    key: &[u8; KEY_SIZE],
    iv: &[u8],
    buffer: &mut Vec<u8>,
) -> CryptoResult<[u8; TAG_SIZE]> {
    let cipher = C::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("AES key rejected: {e}")))?;
    if iv.len() != <C as AeadCore>::NonceSize::USIZE {
        return Err(CryptoError::Encryption(format!("bad IV length {}", iv.len())));
    }
    let nonce = aes_gcm::aead::Nonce::<C>::from_slice(iv);

    let tag = cipher
        .encrypt_in_place_detached(nonce, b"", buffer)
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM seal failed: {e}")))?;

    tag.as_slice()
        .try_into()
        .map_err(|_| CryptoError::Encryption("unexpected GCM tag length".to_string()))
}

fn open_in_place<C: KeyInit + AeadInPlace>(
    key: &[u8; KEY_SIZE],
    iv: &[u8],
    auth_tag: &[u8; TAG_SIZE],
    buffer: &mut Vec<u8>,
) -> CryptoResult<()> {
    let cipher = C::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("AES key rejected: {e}")))?;
    if <C as AeadCore>::TagSize::USIZE != TAG_SIZE {
        return Err(CryptoError::MalformedCiphertext("unexpected GCM tag length".to_string()));
    }
    let nonce = aes_gcm::aead::Nonce::<C>::from_slice(iv);
    let tag = aes_gcm::aead::Tag::<C>::from_slice(auth_tag);

    cipher
        .decrypt_in_place_detached(nonce, b"", buffer, tag)
        .map_err(|_| CryptoError::AuthenticationFailure)
}
