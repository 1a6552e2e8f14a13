//! Contract metadata declared in an archive's manifest.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use tracing::debug;
use vault_types::{ContractClassName, Version, DEFAULT_VERSION};

use crate::error::{ArchiveError, ArchiveResult};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const CONTRACT_CLASSES_ATTRIBUTE: &str = "Contract-Classes";
pub const CONTRACT_VERSION_ATTRIBUTE: &str = "Contract-Version";

/// What an archive says about the contracts it carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractMetadata {
    /// Declared contract class names, in declaration order.
    pub contract_class_names: Vec<ContractClassName>,
    pub version: Version,
}

impl Default for ContractMetadata {
    fn default() -> Self {
        Self {
            contract_class_names: Vec::new(),
            version: DEFAULT_VERSION,
        }
    }
}

/// Reads contract metadata from archive bytes.
pub trait ContractScanner: Send + Sync {
    fn scan(&self, archive: &[u8]) -> ArchiveResult<ContractMetadata>;
}

/// Scanner that trusts the manifest's `Contract-Classes` and
/// `Contract-Version` main attributes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManifestScanner;

impl ContractScanner for ManifestScanner {
    fn scan(&self, archive: &[u8]) -> ArchiveResult<ContractMetadata> {
        let Some(text) = read_manifest(archive)? else {
            return Ok(ContractMetadata::default());
        };
        let attributes = parse_main_attributes(&text);

        let contract_class_names = attributes
            .get(CONTRACT_CLASSES_ATTRIBUTE)
            .map(|value| {
                let mut names: Vec<ContractClassName> = Vec::new();
                for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
                names
            })
            .unwrap_or_default();

        let version = match attributes.get(CONTRACT_VERSION_ATTRIBUTE) {
            Some(raw) => raw.trim().parse::<Version>().unwrap_or_else(|_| {
                debug!(value = %raw, "malformed contract version; using default");
                DEFAULT_VERSION
            }),
            None => DEFAULT_VERSION,
        };

        Ok(ContractMetadata {
            contract_class_names,
            version,
        })
    }
}

fn read_manifest(archive: &[u8]) -> ArchiveResult<Option<String>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| ArchiveError::structure(format!("not a readable archive: {e}")))?;
    let mut entry = match zip.by_name(MANIFEST_PATH) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(ArchiveError::EntryRead {
                name: MANIFEST_PATH.into(),
                reason: e.to_string(),
            })
        }
    };
    let mut raw = Vec::new();
    entry
        .read_to_end(&mut raw)
        .map_err(|e| ArchiveError::EntryRead {
            name: MANIFEST_PATH.into(),
            reason: e.to_string(),
        })?;
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

/// Parse the main section of a manifest: `Name: value` lines up to the first
/// blank line. A line starting with a single space continues the previous
/// value.
pub fn parse_main_attributes(text: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.as_mut() {
                value.push_str(continuation);
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            attributes.insert(name, value);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_string(), value.trim_start().to_string()));
        }
    }
    if let Some((name, value)) = current {
        attributes.insert(name, value);
    }
    attributes
}
