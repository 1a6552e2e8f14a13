use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The bytes are not a readable archive, or the archive is empty.
    #[error("invalid archive structure: {reason}")]
    InvalidStructure { reason: String },

    /// An entry name could escape the archive's root when extracted.
    #[error("unsafe archive entry {name:?}: {reason}")]
    UnsafeEntry { name: String, reason: String },

    /// Some entries are signed by a key that does not sign the rest.
    #[error("inconsistent archive signing: {reason}")]
    InconsistentSigning { reason: String },

    #[error("failed to read archive entry {name:?}: {reason}")]
    EntryRead { name: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ArchiveError {
    pub(crate) fn structure(reason: impl Into<String>) -> Self {
        Self::InvalidStructure {
            reason: reason.into(),
        }
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
