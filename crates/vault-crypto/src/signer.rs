//! Ed25519 signatures over archive signing payloads.
//!
//! Archive signers are recorded as bare [`SignerKey`]s, so verification takes
//! the recorded key directly rather than a separate public key type.

use std::fmt;

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use vault_types::SignerKey;

/// Secret key of an archive signer.
pub struct SigningKey(ed25519_dalek::SigningKey);

impl SigningKey {
    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&secret))
    }

    /// The key recorded against attachments this key signs.
    pub fn signer_key(&self) -> SignerKey {
        SignerKey::from_bytes(self.0.verifying_key().to_bytes())
    }

    pub fn sign(&self, payload: &[u8]) -> Signature {
        Signature(self.0.sign(payload).to_bytes())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningKey").field(&self.signer_key()).finish()
    }
}

/// A 64-byte Ed25519 signature, hex encoded on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature([u8; 64]);

impl TryFrom<String> for Signature {
    type Error = SignatureError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(&text).map_err(|e| SignatureError::Malformed(e.to_string()))?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| SignatureError::Malformed(format!("{} bytes, expected 64", b.len())))?;
        Ok(Self(bytes))
    }
}

impl From<Signature> for String {
    fn from(signature: Signature) -> Self {
        hex::encode(signature.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..6]))
    }
}

/// Check that `signer` produced `signature` over `payload`.
pub fn verify_signature(
    signer: &SignerKey,
    payload: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|_| SignatureError::InvalidKey(*signer))?;
    key.verify(payload, &ed25519_dalek::Signature::from_bytes(&signature.0))
        .map_err(|_| SignatureError::Mismatch(*signer))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signer key {0} is not a valid Ed25519 point")]
    InvalidKey(SignerKey),
    #[error("signature does not match payload for signer {0}")]
    Mismatch(SignerKey),
    #[error("malformed signature: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = b"vault-archive-signature-v1:{\"Cash.class\":\"00ff\"}";

    #[test]
    fn recorded_signer_verifies_its_payload() {
        let key = SigningKey::from_bytes([1; 32]);
        let signature = key.sign(PAYLOAD);
        assert_eq!(verify_signature(&key.signer_key(), PAYLOAD, &signature), Ok(()));
    }

    #[test]
    fn other_signer_or_payload_is_a_mismatch() {
        let key = SigningKey::from_bytes([1; 32]);
        let other = SigningKey::from_bytes([2; 32]).signer_key();
        let signature = key.sign(PAYLOAD);

        assert_eq!(
            verify_signature(&other, PAYLOAD, &signature),
            Err(SignatureError::Mismatch(other))
        );
        assert!(verify_signature(&key.signer_key(), b"different digests", &signature).is_err());
    }

    #[test]
    fn signature_travels_as_hex() {
        let signature = SigningKey::from_bytes([3; 32]).sign(PAYLOAD);
        let json = serde_json::to_string(&signature).unwrap();
        assert_eq!(json, format!("\"{}\"", String::from(signature.clone())));
        assert_eq!(serde_json::from_str::<Signature>(&json).unwrap(), signature);

        assert!(serde_json::from_str::<Signature>("\"abcd\"").is_err());
        assert!(serde_json::from_str::<Signature>("\"not hex\"").is_err());
    }

    #[test]
    fn debug_does_not_print_secret() {
        let key = SigningKey::from_bytes([4; 32]);
        let debug = format!("{key:?}");
        assert!(debug.starts_with("SigningKey(SignerKey("));
        assert!(!debug.contains(&hex::encode([4u8; 32])));
    }
}
