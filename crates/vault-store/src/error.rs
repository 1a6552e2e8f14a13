use vault_types::AttachmentId;

/// Errors from attachment storage operations.
///
/// `Clone` so that one failed load can be reported to every caller that was
/// waiting on it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested attachment was not found.
    #[error("attachment not found: {0}")]
    NotFound(AttachmentId),

    /// An attachment with this id is already stored. Content is never overwritten.
    #[error("attachment already exists: {0}")]
    AlreadyExists(AttachmentId),

    /// The record's id does not match its content.
    #[error("record {id} does not hash to its id")]
    IdMismatch { id: AttachmentId },

    /// The storage backend failed (connection, I/O, constraint).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
