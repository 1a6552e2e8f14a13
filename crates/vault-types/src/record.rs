use std::collections::BTreeSet;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AttachmentId, SignerKey};
use crate::uploader;

/// Version number of a contract attachment.
pub type Version = u32;

/// Version assumed when an archive declares none, or declares garbage.
pub const DEFAULT_VERSION: Version = 1;

/// A logical contract class name, e.g. `com.example.CashContract`.
pub type ContractClassName = String;

/// Durable row for one stored attachment.
///
/// `content` is immutable once written; the only mutable column is
/// `uploader`. The store guarantees `id == digest(content)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub id: AttachmentId,
    pub content: Bytes,
    pub inserted_at: DateTime<Utc>,
    pub uploader: Option<String>,
    pub filename: Option<String>,
    pub contract_class_names: Vec<ContractClassName>,
    pub signers: BTreeSet<SignerKey>,
    pub version: Version,
}

impl AttachmentRecord {
    pub fn is_signed(&self) -> bool {
        !self.signers.is_empty()
    }

    pub fn is_trusted(&self) -> bool {
        uploader::is_trusted(self.uploader.as_deref())
    }

    /// Everything but the content bytes.
    pub fn metadata(&self) -> AttachmentMetadata {
        let kind = match self.contract_class_names.split_first() {
            Some((primary, rest)) => AttachmentKind::Contract(ContractInfo {
                primary_contract: primary.clone(),
                extra_contracts: rest.iter().cloned().collect(),
                signers: self.signers.clone(),
                version: self.version,
            }),
            None => AttachmentKind::Plain,
        };
        AttachmentMetadata {
            id: self.id,
            size: self.content.len(),
            inserted_at: self.inserted_at,
            uploader: self.uploader.clone(),
            filename: self.filename.clone(),
            kind,
        }
    }
}

/// Contract-specific facts about a contract-bearing attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub primary_contract: ContractClassName,
    pub extra_contracts: BTreeSet<ContractClassName>,
    pub signers: BTreeSet<SignerKey>,
    pub version: Version,
}

impl ContractInfo {
    /// All contract class names, primary first.
    pub fn all_contracts(&self) -> impl Iterator<Item = &ContractClassName> {
        std::iter::once(&self.primary_contract).chain(self.extra_contracts.iter())
    }
}

/// An attachment either carries contract code or it doesn't.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentKind {
    Plain,
    Contract(ContractInfo),
}

/// Metadata for a stored attachment, without its bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    pub id: AttachmentId,
    pub size: usize,
    pub inserted_at: DateTime<Utc>,
    pub uploader: Option<String>,
    pub filename: Option<String>,
    pub kind: AttachmentKind,
}

impl AttachmentMetadata {
    pub fn contract(&self) -> Option<&ContractInfo> {
        match &self.kind {
            AttachmentKind::Contract(info) => Some(info),
            AttachmentKind::Plain => None,
        }
    }

    /// Signers of a contract attachment; plain attachments report none.
    pub fn signers(&self) -> BTreeSet<SignerKey> {
        self.contract().map(|c| c.signers.clone()).unwrap_or_default()
    }
}
