//! Archive signatures and signer extraction.
//!
//! A signature block is a `META-INF/*.ED25519` entry holding JSON:
//!
//! ```text
//! { "public_key": "<hex>", "digests": { "<entry>": "<blake3 hex>", ... }, "signature": "<hex>" }
//! ```
//!
//! The signature covers a domain-separated encoding of the digest map. A key
//! co-signs an entry when one of its blocks verifies and lists the entry's
//! current digest. Directory entries, the manifest, and the signature blocks
//! themselves are not content and need no signature.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};

use serde::{Deserialize, Serialize};
use tracing::warn;
use vault_crypto::{verify_signature, AttachmentHasher, Signature, SigningKey};
use vault_types::SignerKey;

use crate::error::{ArchiveError, ArchiveResult};
use crate::manifest::MANIFEST_PATH;

pub const SIGNATURE_BLOCK_SUFFIX: &str = ".ED25519";
const SIGNATURE_DOMAIN: &[u8] = b"vault-archive-signature-v1:";

/// How to treat an archive whose entries are not all signed by the same keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerPolicy {
    /// Any partial or invalid signing makes the whole archive unsigned.
    #[default]
    FailClosed,
    /// Report the keys that sign every content entry; ignore the rest.
    Intersection,
    /// Any partial or invalid signing is an error.
    RequireConsistent,
}

/// One signer's statement about the archive's content entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub public_key: String,
    pub digests: BTreeMap<String, String>,
    pub signature: Signature,
}

impl SignatureBlock {
    pub fn sign(key: &SigningKey, digests: &BTreeMap<String, [u8; 32]>) -> ArchiveResult<Self> {
        let digests: BTreeMap<String, String> = digests
            .iter()
            .map(|(name, digest)| (name.clone(), hex::encode(digest)))
            .collect();
        let signature = key.sign(&signing_payload(&digests)?);
        Ok(Self {
            public_key: key.signer_key().to_hex(),
            digests,
            signature,
        })
    }

    /// The signer's key if the signature is valid.
    pub fn verify(&self) -> Option<SignerKey> {
        let signer = SignerKey::from_hex(&self.public_key).ok()?;
        let payload = signing_payload(&self.digests).ok()?;
        verify_signature(&signer, &payload, &self.signature).ok()?;
        Some(signer)
    }
}

fn signing_payload(digests: &BTreeMap<String, String>) -> ArchiveResult<Vec<u8>> {
    let body =
        serde_json::to_vec(digests).map_err(|e| ArchiveError::Serialization(e.to_string()))?;
    let mut payload = SIGNATURE_DOMAIN.to_vec();
    payload.extend_from_slice(&body);
    Ok(payload)
}

fn is_signature_block(name: &str) -> bool {
    name.starts_with("META-INF/") && name.ends_with(SIGNATURE_BLOCK_SUFFIX)
}

/// Return the keys that co-sign every content entry of `archive`.
///
/// The result is empty for an unsigned archive, and for an archive with no
/// content entries.
pub fn extract_signers(archive: &[u8], policy: SignerPolicy) -> ArchiveResult<BTreeSet<SignerKey>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| ArchiveError::structure(format!("not a readable archive: {e}")))?;

    let mut content: BTreeMap<String, String> = BTreeMap::new();
    let mut blocks: Vec<(String, Vec<u8>)> = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| ArchiveError::structure(format!("unreadable entry #{index}: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name == MANIFEST_PATH {
            continue;
        }
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| ArchiveError::EntryRead {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        if is_signature_block(&name) {
            blocks.push((name, data));
        } else {
            content.insert(name, hex::encode(AttachmentHasher::raw_blake3(&data)));
        }
    }

    let mut coverage: BTreeMap<SignerKey, BTreeSet<&str>> = BTreeMap::new();
    let mut invalid_blocks = Vec::new();
    for (name, data) in &blocks {
        let verified = serde_json::from_slice::<SignatureBlock>(data)
            .ok()
            .and_then(|block| block.verify().map(|key| (key, block)));
        let Some((key, block)) = verified else {
            warn!(entry = %name, "ignoring invalid signature block");
            invalid_blocks.push(name.clone());
            continue;
        };
        let covered = coverage.entry(key).or_default();
        for (entry, actual) in &content {
            if block.digests.get(entry) == Some(actual) {
                covered.insert(entry.as_str());
            }
        }
    }

    if content.is_empty() {
        return Ok(BTreeSet::new());
    }

    let mut signers = BTreeSet::new();
    let mut partial = Vec::new();
    for (key, covered) in &coverage {
        if covered.len() == content.len() {
            signers.insert(*key);
        } else {
            partial.push((*key, covered.len()));
        }
    }

    if partial.is_empty() && invalid_blocks.is_empty() {
        return Ok(signers);
    }

    let reason = format!(
        "{} key(s) sign only part of {} entries, {} invalid signature block(s)",
        partial.len(),
        content.len(),
        invalid_blocks.len()
    );
    match policy {
        SignerPolicy::Intersection => Ok(signers),
        SignerPolicy::FailClosed => {
            warn!(%reason, "treating inconsistently signed archive as unsigned");
            Ok(BTreeSet::new())
        }
        SignerPolicy::RequireConsistent => Err(ArchiveError::InconsistentSigning { reason }),
    }
}
