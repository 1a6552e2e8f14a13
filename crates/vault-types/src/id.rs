use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Digest algorithm an [`AttachmentId`] was computed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Blake3,
    Sha256,
}

impl DigestAlgorithm {
    pub const ALL: [Self; 2] = [Self::Blake3, Self::Sha256];

    /// Canonical upper-case label used in the textual id form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Blake3 => "BLAKE3",
            Self::Sha256 => "SHA256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BLAKE3" => Ok(Self::Blake3),
            "SHA256" | "SHA-256" => Ok(Self::Sha256),
            other => Err(TypeError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Content-addressed identifier of a stored attachment.
///
/// An `AttachmentId` is the digest of the attachment's raw archive bytes,
/// tagged with the algorithm that produced it. Identical content hashed with
/// the same algorithm always produces the same id, which makes attachments
/// deduplicatable and verifiable on read.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachmentId {
    algorithm: DigestAlgorithm,
    digest: [u8; 32],
}

impl AttachmentId {
    /// Wrap a pre-computed digest.
    pub const fn new(algorithm: DigestAlgorithm, digest: [u8; 32]) -> Self {
        Self { algorithm, digest }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// The raw 32-byte digest.
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Size of the key in bytes, used when weighing cache entries.
    pub fn size(&self) -> usize {
        self.digest.len()
    }

    /// Hex-encoded digest without the algorithm prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.digest[..4])
    }
}

impl fmt::Debug for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttachmentId({}:{})", self.algorithm, self.short_hex())
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl FromStr for AttachmentId {
    type Err = TypeError;

    /// Parse the `ALGO:HEX` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algo, hex_part) = s
            .split_once(':')
            .ok_or_else(|| TypeError::MalformedId(s.to_string()))?;
        let algorithm = algo.parse()?;
        let bytes = hex::decode(hex_part).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let digest: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self::new(algorithm, digest))
    }
}

/// Public key of an archive signer (Ed25519, 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignerKey([u8; 32]);

impl SignerKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignerKey({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttachmentId {
        AttachmentId::new(DigestAlgorithm::Sha256, [0xab; 32])
    }

    #[test]
    fn display_carries_algorithm_prefix() {
        let text = sample().to_string();
        assert!(text.starts_with("SHA256:"));
        assert_eq!(text.len(), "SHA256:".len() + 64);
    }

    #[test]
    fn parse_display_form() {
        let id = sample();
        let parsed: AttachmentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        let err = hex::encode([1u8; 32]).parse::<AttachmentId>().unwrap_err();
        assert!(matches!(err, TypeError::MalformedId(_)));
    }

    #[test]
    fn parse_rejects_short_digest() {
        let err = "BLAKE3:abcd".parse::<AttachmentId>().unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn parse_rejects_unknown_algorithm() {
        let text = format!("MD5:{}", hex::encode([0u8; 32]));
        assert!(matches!(
            text.parse::<AttachmentId>(),
            Err(TypeError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn same_digest_different_algorithm_is_distinct() {
        let a = AttachmentId::new(DigestAlgorithm::Sha256, [7; 32]);
        let b = AttachmentId::new(DigestAlgorithm::Blake3, [7; 32]);
        assert_ne!(a, b);
    }

    #[test]
    fn signer_key_hex_roundtrip() {
        let key = SignerKey::from_bytes([9; 32]);
        assert_eq!(SignerKey::from_hex(&key.to_hex()).unwrap(), key);
    }

    proptest::proptest! {
        #[test]
        fn any_digest_survives_text_form(bytes in proptest::array::uniform32(0u8..)) {
            let id = AttachmentId::new(DigestAlgorithm::Blake3, bytes);
            let parsed: AttachmentId = id.to_string().parse().unwrap();
            proptest::prop_assert_eq!(parsed, id);
        }
    }
}
