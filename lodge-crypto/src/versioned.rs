//! The `VersionedCiphertext` wire format.
//!
//! ```text
//! v2:<kemCiphertext>:<rsaWrappedKey>:<iv>:<authTag>:<ciphertext>   hybrid, current
//! v1:<iv>:<authTag>:<ciphertext>                                   legacy, AES only
//! <iv>:<authTag>:<ciphertext>                                      legacy, unprefixed
//! anything else                                                    plaintext
//! ```
//!
//! Every field is lowercase hex. Formats are recognised by an ordered table of
//! `(predicate, parser)` pairs; the first matching predicate wins, and the
//! plaintext arm matches everything. A new version is a new row placed ahead
//! of the legacy rows, never an edit to an existing one.

use crate::cipher::{SealedPayload, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};
use std::fmt;

pub const SEPARATOR: char = ':';
pub const V1_TAG: &str = "v1";
pub const V2_TAG: &str = "v2";

const V1_FIELDS: usize = 4;
const V2_FIELDS: usize = 6;
const LEGACY_FIELDS: usize = 3;
pub const REGISTRY_IV_SIZE: usize = 16;

/// Which dispatch arm handles a stored blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CiphertextFormat {
    HybridV2,
    LegacyV1,
    LegacyUnprefixed,
    Plaintext,
}

impl CiphertextFormat {
    /// Reports the format without decoding any field.
    pub fn detect(input: &str) -> Self {
        let fields: Vec<&str> = input.split(SEPARATOR).collect();
        FORMATS
            .iter()
            .find(|rule| (rule.matches)(&fields))
            .map(|rule| rule.format)
            .unwrap_or(Self::Plaintext)
    }

    /// Whether this format claims to be encrypted.
    pub fn is_encrypted(self) -> bool {
        !matches!(self, Self::Plaintext)
    }
}

impl fmt::Display for CiphertextFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HybridV2 => "v2",
            Self::LegacyV1 => "v1",
            Self::LegacyUnprefixed => "legacy",
            Self::Plaintext => "plaintext",
        };
        f.write_str(name)
    }
}

/// Fields of a hybrid `v2` blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HybridFields {
    pub kem_ciphertext: Vec<u8>,
    pub rsa_wrapped_key: Vec<u8>,
    pub payload: SealedPayload,
}

/// A parsed registry blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionedCiphertext {
    HybridV2(HybridFields),
    LegacyV1(SealedPayload),
    LegacyUnprefixed(SealedPayload),
    Plaintext(Vec<u8>),
}

impl VersionedCiphertext {
    pub fn parse(input: &str) -> CryptoResult<Self> {
        let fields: Vec<&str> = input.split(SEPARATOR).collect();
        for rule in FORMATS {
            if (rule.matches)(&fields) {
                return (rule.parse)(input, &fields);
            }
        }
        Ok(Self::Plaintext(input.as_bytes().to_vec()))
    }

    pub fn format(&self) -> CiphertextFormat {
        match self {
            Self::HybridV2(_) => CiphertextFormat::HybridV2,
            Self::LegacyV1(_) => CiphertextFormat::LegacyV1,
            Self::LegacyUnprefixed(_) => CiphertextFormat::LegacyUnprefixed,
            Self::Plaintext(_) => CiphertextFormat::Plaintext,
        }
    }

    /// Renders a `v2` blob. Legacy and plaintext forms are never produced.
    pub fn encode_v2(fields: &HybridFields) -> String {
        [
            V2_TAG.to_string(),
            hex::encode(&fields.kem_ciphertext),
            hex::encode(&fields.rsa_wrapped_key),
            hex::encode(&fields.payload.iv),
            hex::encode(fields.payload.auth_tag),
            hex::encode(&fields.payload.ciphertext),
        ]
        .join(":")
    }
}

struct FormatRule {
    format: CiphertextFormat,
    matches: fn(&[&str]) -> bool,
    parse: fn(&str, &[&str]) -> CryptoResult<VersionedCiphertext>,
}

/// Ordered dispatch table. Tagged formats come first and fail closed on a bad
/// shape; the unprefixed legacy arm requires all-hex fields so JSON that
/// happens to contain colons falls through to plaintext.
const FORMATS: &[FormatRule] = &[
    FormatRule {
        format: CiphertextFormat::HybridV2,
        matches: |fields| fields.first() == Some(&V2_TAG),
        parse: parse_v2,
    },
    FormatRule {
        format: CiphertextFormat::LegacyV1,
        matches: |fields| fields.first() == Some(&V1_TAG),
        parse: parse_v1,
    },
    FormatRule {
        format: CiphertextFormat::LegacyUnprefixed,
        matches: |fields| fields.len() == LEGACY_FIELDS && fields.iter().all(|f| is_hex(f)),
        parse: parse_unprefixed,
    },
    FormatRule {
        format: CiphertextFormat::Plaintext,
        matches: |_| true,
        parse: |input, _| Ok(VersionedCiphertext::Plaintext(input.as_bytes().to_vec())),
    },
];

fn parse_v2(_input: &str, fields: &[&str]) -> CryptoResult<VersionedCiphertext> {
    expect_field_count(V2_TAG, fields, V2_FIELDS)?;
    let kem_ciphertext = decode_field("kemCiphertext", fields[1])?;
    let rsa_wrapped_key = decode_field("rsaWrappedKey", fields[2])?;
    let payload = decode_payload(&fields[3..])?;
    Ok(VersionedCiphertext::HybridV2(HybridFields {
        kem_ciphertext,
        rsa_wrapped_key,
        payload,
    }))
}

fn parse_v1(_input: &str, fields: &[&str]) -> CryptoResult<VersionedCiphertext> {
    expect_field_count(V1_TAG, fields, V1_FIELDS)?;
    Ok(VersionedCiphertext::LegacyV1(decode_payload(&fields[1..])?))
}

fn parse_unprefixed(_input: &str, fields: &[&str]) -> CryptoResult<VersionedCiphertext> {
    Ok(VersionedCiphertext::LegacyUnprefixed(decode_payload(fields)?))
}

fn expect_field_count(tag: &str, fields: &[&str], expected: usize) -> CryptoResult<()> {
    if fields.len() != expected {
        return Err(CryptoError::MalformedCiphertext(format!(
            "{tag} blob has {} fields, expected {expected}",
            fields.len()
        )));
    }
    Ok(())
}

/// Decodes `iv:authTag:ciphertext`.
fn decode_payload(fields: &[&str]) -> CryptoResult<SealedPayload> {
    let iv = decode_field("iv", fields[0])?;
    if iv.len() != REGISTRY_IV_SIZE {
        return Err(CryptoError::MalformedCiphertext(format!(
            "iv must be {REGISTRY_IV_SIZE} bytes, got {}",
            iv.len()
        )));
    }
    let tag = decode_field("authTag", fields[1])?;
    let auth_tag: [u8; TAG_SIZE] = tag.as_slice().try_into().map_err(|_| {
        CryptoError::MalformedCiphertext(format!(
            "authTag must be {TAG_SIZE} bytes, got {}",
            tag.len()
        ))
    })?;
    let ciphertext = decode_field("ciphertext", fields[2])?;
    Ok(SealedPayload {
        iv,
        auth_tag,
        ciphertext,
    })
}

fn decode_field(name: &str, field: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(field)
        .map_err(|e| CryptoError::MalformedCiphertext(format!("{name} is not valid hex: {e}")))
}

fn is_hex(field: &str) -> bool {
    !field.is_empty() && field.len() % 2 == 0 && field.bytes().all(|b| b.is_ascii_hexdigit())
}
