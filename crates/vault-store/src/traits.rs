use vault_types::{AttachmentId, AttachmentRecord};

use crate::error::StoreResult;
use crate::query::{AttachmentQuery, AttachmentSort, Predicate};

/// Transactional boundary over the durable attachment table.
///
/// All implementations must satisfy these invariants:
/// - Each method is one atomic unit of work.
/// - `content` is immutable once written: `insert` never overwrites, and the
///   only mutable column is `uploader`.
/// - `id == digest(content)` for every stored row.
/// - Two concurrent inserts of the same id produce exactly one row; the loser
///   gets [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists).
/// - There is no delete: the table is append-only.
pub trait AttachmentStorage: Send + Sync {
    /// Read a row by id. Returns `Ok(None)` if it does not exist.
    fn get(&self, id: &AttachmentId) -> StoreResult<Option<AttachmentRecord>>;

    /// Check whether a row exists.
    fn exists(&self, id: &AttachmentId) -> StoreResult<bool>;

    /// Insert a new row, failing with `AlreadyExists` if the id is present.
    fn insert(&self, record: AttachmentRecord) -> StoreResult<()>;

    /// Replace the uploader of an existing row.
    fn update_uploader(&self, id: &AttachmentId, uploader: &str) -> StoreResult<()>;

    /// All rows matching `query`, ordered by `sort`.
    fn query(&self, query: &AttachmentQuery, sort: &AttachmentSort)
        -> StoreResult<Vec<AttachmentRecord>>;

    /// Number of stored rows.
    fn count(&self) -> StoreResult<u64>;

    /// Rows declaring `contract`, newest version first, most recently
    /// inserted first within a version.
    fn query_versions(
        &self,
        contract: &str,
        trusted_only: bool,
    ) -> StoreResult<Vec<AttachmentRecord>> {
        let mut query = AttachmentQuery::new()
            .contract_class_name(Predicate::Equal(contract.to_string()))
            .version(Predicate::GreaterThanOrEqual(0));
        if trusted_only {
            query = query.trusted_only();
        }
        self.query(&query, &AttachmentSort::latest_first())
    }
}
