use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;
use vault_crypto::AttachmentHasher;
use vault_types::{AttachmentId, AttachmentRecord};

use crate::error::{StoreError, StoreResult};
use crate::query::{AttachmentQuery, AttachmentSort};
use crate::traits::AttachmentStorage;

/// In-memory, HashMap-based attachment table.
///
/// Intended for tests and embedding. All rows are held behind a `RwLock`;
/// each trait method takes the lock once, which makes it atomic. Content is
/// reference-counted, so reads are cheap.
pub struct InMemoryAttachmentStorage {
    rows: RwLock<HashMap<AttachmentId, AttachmentRecord>>,
}

impl InMemoryAttachmentStorage {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> usize {
        self.rows.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryAttachmentStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentStorage for InMemoryAttachmentStorage {
    fn get(&self, id: &AttachmentId) -> StoreResult<Option<AttachmentRecord>> {
        let rows = self.rows.read().expect("lock poisoned");
        Ok(rows.get(id).cloned())
    }

    fn exists(&self, id: &AttachmentId) -> StoreResult<bool> {
        let rows = self.rows.read().expect("lock poisoned");
        Ok(rows.contains_key(id))
    }

    fn insert(&self, record: AttachmentRecord) -> StoreResult<()> {
        if !AttachmentHasher::new(record.id.algorithm()).verify(&record.content, &record.id) {
            return Err(StoreError::IdMismatch { id: record.id });
        }
        let mut rows = self.rows.write().expect("lock poisoned");
        if rows.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        debug!(id = %record.id, size = record.content.len(), "attachment row inserted");
        rows.insert(record.id, record);
        Ok(())
    }

    fn update_uploader(&self, id: &AttachmentId, uploader: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().expect("lock poisoned");
        let row = rows.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        row.uploader = Some(uploader.to_string());
        Ok(())
    }

    fn query(
        &self,
        query: &AttachmentQuery,
        sort: &AttachmentSort,
    ) -> StoreResult<Vec<AttachmentRecord>> {
        let rows = self.rows.read().expect("lock poisoned");
        let mut matched: Vec<AttachmentRecord> =
            rows.values().filter(|r| query.matches(r)).cloned().collect();
        drop(rows);
        matched.sort_by(|a, b| sort.compare(a, b));
        Ok(matched)
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.len() as u64)
    }
}

impl std::fmt::Debug for InMemoryAttachmentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAttachmentStorage")
            .field("row_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::{Arc, Barrier};

    use bytes::Bytes;
    use chrono::Utc;
    use vault_types::{SignerKey, Version};

    use super::*;
    use crate::query::Predicate;

    fn row(content: &[u8], names: &[&str], version: Version, uploader: &str, signed: bool) -> AttachmentRecord {
        AttachmentRecord {
            id: AttachmentHasher::BLAKE3.hash(content),
            content: Bytes::copy_from_slice(content),
            inserted_at: Utc::now(),
            uploader: Some(uploader.to_string()),
            filename: None,
            contract_class_names: names.iter().map(|s| s.to_string()).collect(),
            signers: if signed {
                BTreeSet::from([SignerKey::from_bytes([1; 32])])
            } else {
                BTreeSet::new()
            },
            version,
        }
    }

    #[test]
    fn insert_and_get() {
        let store = InMemoryAttachmentStorage::new();
        let r = row(b"jar one", &["c.C"], 1, "app", false);
        store.insert(r.clone()).unwrap();
        assert_eq!(store.get(&r.id).unwrap(), Some(r.clone()));
        assert!(store.exists(&r.id).unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let store = InMemoryAttachmentStorage::new();
        let id = AttachmentHasher::BLAKE3.hash(b"nope");
        assert_eq!(store.get(&id).unwrap(), None);
        assert!(!store.exists(&id).unwrap());
    }

    #[test]
    fn second_insert_is_rejected_not_overwritten() {
        let store = InMemoryAttachmentStorage::new();
        let first = row(b"same", &[], 1, "alice", false);
        let mut second = first.clone();
        second.uploader = Some("bob".into());
        store.insert(first.clone()).unwrap();
        assert_eq!(store.insert(second), Err(StoreError::AlreadyExists(first.id)));
        assert_eq!(store.get(&first.id).unwrap().unwrap().uploader.as_deref(), Some("alice"));
    }

    #[test]
    fn insert_rejects_id_that_does_not_match_content() {
        let store = InMemoryAttachmentStorage::new();
        let mut r = row(b"content", &[], 1, "app", false);
        r.content = Bytes::from_static(b"other content");
        assert!(matches!(store.insert(r), Err(StoreError::IdMismatch { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_inserts_have_one_winner() {
        let store = Arc::new(InMemoryAttachmentStorage::new());
        let barrier = Arc::new(Barrier::new(8));
        let r = row(b"racy", &[], 1, "app", false);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let r = r.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.insert(r)
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_uploader_touches_only_uploader() {
        let store = InMemoryAttachmentStorage::new();
        let r = row(b"upd", &["c.C"], 2, "p2p:peer", true);
        store.insert(r.clone()).unwrap();
        store.update_uploader(&r.id, "app").unwrap();
        let updated = store.get(&r.id).unwrap().unwrap();
        assert_eq!(updated.uploader.as_deref(), Some("app"));
        assert_eq!(updated.content, r.content);
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn update_uploader_of_missing_row_fails() {
        let store = InMemoryAttachmentStorage::new();
        let id = AttachmentHasher::BLAKE3.hash(b"ghost");
        assert_eq!(store.update_uploader(&id, "app"), Err(StoreError::NotFound(id)));
    }

    #[test]
    fn query_versions_filters_and_orders() {
        let store = InMemoryAttachmentStorage::new();
        store.insert(row(b"v1", &["c.C"], 1, "app", false)).unwrap();
        store.insert(row(b"v3", &["c.C", "d.D"], 3, "rpc", true)).unwrap();
        store.insert(row(b"v2-untrusted", &["c.C"], 2, "p2p:peer", false)).unwrap();
        store.insert(row(b"other", &["d.D"], 9, "app", false)).unwrap();

        let trusted: Vec<Version> = store
            .query_versions("c.C", true)
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(trusted, vec![3, 1]);

        let all = store.query_versions("c.C", false).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn query_by_signer() {
        let store = InMemoryAttachmentStorage::new();
        let signed = row(b"s", &[], 1, "app", true);
        store.insert(signed.clone()).unwrap();
        store.insert(row(b"u", &[], 1, "app", false)).unwrap();
        let q = AttachmentQuery::new().signer(Predicate::Equal(SignerKey::from_bytes([1; 32])));
        let found = store.query(&q, &AttachmentSort::default()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, signed.id);
    }
}
