use std::io;

use vault_archive::ArchiveError;
use vault_crypto::IntegrityFault;
use vault_store::StoreError;
use vault_types::{AttachmentId, ContractClassName, Version};

/// Errors surfaced by the attachment service.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    /// Stored content no longer hashes to its id.
    #[error(transparent)]
    IntegrityFault(#[from] IntegrityFault),

    /// The archive is malformed, unsafe, or inconsistently signed.
    #[error("invalid archive structure: {0}")]
    InvalidArchiveStructure(#[from] ArchiveError),

    /// The caller tried to claim a reserved uploader identity.
    #[error("uploader token '{uploader}' is reserved")]
    RejectedUploaderToken { uploader: String },

    /// The content is already stored and the caller may not re-attribute it.
    #[error("attachment already stored: {0}")]
    DuplicateAttachment(AttachmentId),

    /// A trusted signed attachment already occupies this contract version.
    #[error("contract {contract} version {version} is already provided by signed attachment(s) {existing:?}")]
    DuplicateVersionedContract {
        contract: ContractClassName,
        version: Version,
        existing: Vec<AttachmentId>,
    },

    #[error("storage error: {0}")]
    Store(StoreError),

    /// Reading attachment content failed for a reason other than its digest.
    #[error("attachment read failed: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for AttachmentError {
    fn from(err: StoreError) -> Self {
        match err {
            // A caller only sees a lost insert race as a duplicate.
            StoreError::AlreadyExists(id) => Self::DuplicateAttachment(id),
            other => Self::Store(other),
        }
    }
}

/// Result alias for attachment service operations.
pub type AttachmentResult<T> = Result<T, AttachmentError>;
