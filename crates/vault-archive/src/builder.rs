use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use vault_crypto::SigningKey;
use vault_types::Version;
use zip::write::SimpleFileOptions;

use crate::error::{ArchiveError, ArchiveResult};
use crate::manifest::{CONTRACT_CLASSES_ATTRIBUTE, CONTRACT_VERSION_ATTRIBUTE, MANIFEST_PATH};
use crate::signing::SignatureBlock;

/// Assembles archives, optionally with a manifest and signature blocks.
///
/// Entries are written in insertion order. Each signer signs every content
/// entry unless restricted with [`sign_entries_with`](Self::sign_entries_with).
#[derive(Default)]
pub struct ArchiveBuilder {
    manifest: Vec<(String, String)>,
    entries: Vec<(String, Vec<u8>)>,
    signers: Vec<(SigningKey, Option<Vec<String>>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a main-section manifest attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.manifest.push((name.into(), value.into()));
        self
    }

    /// Declare the contract class names this archive implements.
    pub fn contracts<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = names
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.attribute(CONTRACT_CLASSES_ATTRIBUTE, joined)
    }

    pub fn version(self, version: Version) -> Self {
        self.attribute(CONTRACT_VERSION_ATTRIBUTE, version.to_string())
    }

    pub fn entry(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.entries.push((name.into(), data));
        self
    }

    /// Sign every content entry with `key`.
    pub fn sign_with(mut self, key: SigningKey) -> Self {
        self.signers.push((key, None));
        self
    }

    /// Sign only the named entries with `key`.
    pub fn sign_entries_with(mut self, key: SigningKey, names: &[&str]) -> Self {
        let names = names.iter().map(|s| s.to_string()).collect();
        self.signers.push((key, Some(names)));
        self
    }

    pub fn build(self) -> ArchiveResult<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let zip_err = |e: zip::result::ZipError| ArchiveError::Serialization(e.to_string());
        let io_err = |e: std::io::Error| ArchiveError::Serialization(e.to_string());

        if !self.manifest.is_empty() {
            let mut text = String::from("Manifest-Version: 1.0\r\n");
            for (name, value) in &self.manifest {
                text.push_str(&format!("{name}: {value}\r\n"));
            }
            text.push_str("\r\n");
            writer.start_file(MANIFEST_PATH, options).map_err(zip_err)?;
            writer.write_all(text.as_bytes()).map_err(io_err)?;
        }

        for (name, data) in &self.entries {
            writer.start_file(name.as_str(), options).map_err(zip_err)?;
            writer.write_all(data).map_err(io_err)?;
        }

        for (index, (key, only)) in self.signers.iter().enumerate() {
            let digests: BTreeMap<String, [u8; 32]> = self
                .entries
                .iter()
                .filter(|(name, _)| only.as_ref().map_or(true, |o| o.contains(name)))
                .map(|(name, data)| (name.clone(), vault_crypto::AttachmentHasher::raw_blake3(data)))
                .collect();
            let block = SignatureBlock::sign(key, &digests)?;
            let json = serde_json::to_vec_pretty(&block)
                .map_err(|e| ArchiveError::Serialization(e.to_string()))?;
            writer
                .start_file(format!("META-INF/SIGNER{index}.ED25519"), options)
                .map_err(zip_err)?;
            writer.write_all(&json).map_err(io_err)?;
        }

        let cursor = writer.finish().map_err(zip_err)?;
        Ok(cursor.into_inner())
    }
}

impl std::fmt::Debug for ArchiveBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBuilder")
            .field("entries", &self.entries.len())
            .field("signers", &self.signers.len())
            .finish()
    }
}
