//! Long-term key material for the hybrid registry cipher.
//!
//! A [`QuantumKeySet`] is generated once per deployment. Its public halves
//! are distributed through configuration ([`PublicKeyConfig`]); its private
//! halves ([`PrivateHalves`]) only ever leave memory inside an
//! [`EncryptedKeyEnvelope`](crate::envelope::EncryptedKeyEnvelope).

use crate::error::{CryptoError, CryptoResult};
use crate::{kem, rsa_wrap};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// ML-KEM-768 key pair.
#[derive(Clone)]
pub struct KemKeyPair {
    pub public_key: Vec<u8>,
    private_key: Zeroizing<Vec<u8>>,
}

impl KemKeyPair {
    pub fn generate() -> Self {
        let (public_key, private_key) = kem::generate_keypair();
        Self {
            public_key,
            private_key,
        }
    }

    pub fn from_parts(public_key: Vec<u8>, private_key: Vec<u8>) -> CryptoResult<Self> {
        let private_key = Zeroizing::new(private_key);
        kem::validate_public_key(&public_key)?;
        if private_key.len() != kem::secret_key_size() {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "ML-KEM-768 secret key must be {} bytes, got {}",
                kem::secret_key_size(),
                private_key.len()
            )));
        }
        Ok(Self {
            public_key,
            private_key,
        })
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

impl fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KemKeyPair")
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

/// RSA key pair held as PEM text.
#[derive(Clone)]
pub struct RsaKeyPair {
    pub public_key: String,
    private_key: Zeroizing<String>,
}

impl RsaKeyPair {
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        let (public_key, private_key) = rsa_wrap::generate_keypair(bits)?;
        Ok(Self {
            public_key,
            private_key,
        })
    }

    pub fn from_parts(public_key: String, private_key: String) -> CryptoResult<Self> {
        let private_key = Zeroizing::new(private_key);
        rsa_wrap::parse_public_key(&public_key)?;
        rsa_wrap::parse_private_key(&private_key)?;
        Ok(Self {
            public_key,
            private_key,
        })
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair").finish_non_exhaustive()
    }
}

/// The KEM and RSA key pairs used together by the hybrid cipher.
#[derive(Clone, Debug)]
pub struct QuantumKeySet {
    pub kem: KemKeyPair,
    pub rsa: RsaKeyPair,
}

impl QuantumKeySet {
    /// Generates a deployment key set with a 4096-bit RSA layer.
    pub fn generate() -> CryptoResult<Self> {
        Self::generate_with_rsa_bits(rsa_wrap::DEFAULT_RSA_BITS)
    }

    pub fn generate_with_rsa_bits(bits: usize) -> CryptoResult<Self> {
        Ok(Self {
            kem: KemKeyPair::generate(),
            rsa: RsaKeyPair::generate(bits)?,
        })
    }

    /// Reassembles a key set from distributed public halves and decrypted
    /// private halves.
    pub fn from_halves(public: &PublicKeyConfig, private: &PrivateHalves) -> CryptoResult<Self> {
        let (kem_public, rsa_public) = public.decode()?;
        let kem_private = hex::decode(&private.kem_private_key).map_err(|e| {
            CryptoError::InvalidKeyMaterial(format!("KEM private key is not hex: {e}"))
        })?;

        Ok(Self {
            kem: KemKeyPair::from_parts(kem_public, kem_private)?,
            rsa: RsaKeyPair::from_parts(rsa_public, private.rsa_private_key.clone())?,
        })
    }

    /// Checks that the public and private halves belong together: the KEM
    /// pair agrees on a trial encapsulation and the RSA public key matches
    /// the one derived from the private key.
    pub fn verify_consistency(&self) -> CryptoResult<()> {
        let trial = kem::encapsulate(&self.kem.public_key)?;
        let recovered = kem::decapsulate(self.kem.private_key(), &trial.ciphertext)?;
        if *recovered != *trial.shared_secret {
            return Err(CryptoError::InvalidKeyMaterial(
                "KEM public and private keys do not match".to_string(),
            ));
        }

        let public = rsa_wrap::parse_public_key(&self.rsa.public_key)?;
        let private = rsa_wrap::parse_private_key(self.rsa.private_key())?;
        if rsa::RsaPublicKey::from(&private) != public {
            return Err(CryptoError::InvalidKeyMaterial(
                "RSA public and private keys do not match".to_string(),
            ));
        }
        Ok(())
    }

    /// Public halves in the encoding configuration expects.
    pub fn public_config(&self) -> PublicKeyConfig {
        PublicKeyConfig {
            kem_public_key: hex::encode(&self.kem.public_key),
            rsa_public_key: BASE64.encode(self.rsa.public_key.as_bytes()),
        }
    }

    /// Private halves as the structured record sealed into the envelope,
    /// together with the public halves they belong to.
    pub fn private_halves(&self) -> PrivateHalves {
        PrivateHalves {
            kem_private_key: hex::encode(self.kem.private_key()),
            rsa_private_key: self.rsa.private_key().to_string(),
            public_keys: Some(self.public_config()),
        }
    }
}

/// Public halves as they appear in configuration: hex KEM key and
/// base64-encoded RSA PEM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyConfig {
    pub kem_public_key: String,
    pub rsa_public_key: String,
}

impl PublicKeyConfig {
    /// Decodes to `(KEM public key bytes, RSA public PEM)`, validating both.
    pub fn decode(&self) -> CryptoResult<(Vec<u8>, String)> {
        let kem_public = hex::decode(self.kem_public_key.trim()).map_err(|e| {
            CryptoError::InvalidKeyMaterial(format!("KEM public key is not hex: {e}"))
        })?;
        kem::validate_public_key(&kem_public)?;

        let pem_bytes = BASE64.decode(self.rsa_public_key.trim()).map_err(|e| {
            CryptoError::InvalidKeyMaterial(format!("RSA public key is not base64: {e}"))
        })?;
        let rsa_public = String::from_utf8(pem_bytes).map_err(|_| {
            CryptoError::InvalidKeyMaterial("RSA public key PEM is not UTF-8".to_string())
        })?;
        rsa_wrap::parse_public_key(&rsa_public)?;

        Ok((kem_public, rsa_public))
    }
}

/// Private halves of a [`QuantumKeySet`]; the plaintext of the key envelope.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct PrivateHalves {
    /// Hex-encoded ML-KEM-768 secret key.
    pub kem_private_key: String,
    /// PKCS#8 PEM.
    pub rsa_private_key: String,
    /// Public halves sealed with the private ones. Absent in envelopes
    /// written before they were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub public_keys: Option<PublicKeyConfig>,
}

impl PrivateHalves {
    /// Public halves to pair with this record: the sealed ones when present,
    /// otherwise `configured`. The flag is set when `configured` disagrees
    /// with the sealed halves, as it does after a rotation until
    /// configuration is updated.
    pub fn effective_public_keys<'a>(
        &'a self,
        configured: &'a PublicKeyConfig,
    ) -> CryptoResult<(&'a PublicKeyConfig, bool)> {
        let Some(sealed) = &self.public_keys else {
            return Ok((configured, false));
        };
        let sealed_decoded = sealed.decode()?;
        let stale = configured.decode().map_or(true, |c| c != sealed_decoded);
        Ok((sealed, stale))
    }
}

impl fmt::Debug for PrivateHalves {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateHalves([redacted])")
    }
}
