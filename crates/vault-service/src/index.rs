//! Per-contract index of trusted attachments by version.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, warn};
use vault_cache::{CacheStats, Lookup, SingleFlightCache};
use vault_store::{AttachmentStorage, StoreError, StoreResult};
use vault_types::{AttachmentId, AttachmentRecord, ContractClassName, Version};

/// The signed and unsigned attachment chosen for one version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttachmentIds {
    pub signed: Option<AttachmentId>,
    pub unsigned: Option<AttachmentId>,
}

impl AttachmentIds {
    /// Signed first when both are present.
    pub fn to_vec(&self) -> Vec<AttachmentId> {
        self.signed.into_iter().chain(self.unsigned).collect()
    }
}

pub type VersionMap = BTreeMap<Version, AttachmentIds>;

/// Cached `version → {signed, unsigned}` maps, built from trusted rows.
pub struct VersionIndex {
    storage: Arc<dyn AttachmentStorage>,
    cache: SingleFlightCache<ContractClassName, Arc<VersionMap>, StoreError>,
    dev_mode: bool,
}

impl VersionIndex {
    pub fn new(storage: Arc<dyn AttachmentStorage>, max_entries: u64, dev_mode: bool) -> Self {
        Self {
            storage,
            cache: SingleFlightCache::with_capacity("contract-versions", max_entries),
            dev_mode,
        }
    }

    pub fn versions(&self, contract: &str) -> StoreResult<Arc<VersionMap>> {
        let key = contract.to_string();
        let found = self.cache.get_or_load(&key, |contract| {
            let rows = self.storage.query_versions(contract, true)?;
            Ok(Lookup::Present(Arc::new(build_versions(contract, &rows, self.dev_mode))))
        })?;
        Ok(found.into_option().unwrap_or_default())
    }

    /// Newest signed and newest unsigned attachment at or above `min_version`.
    pub fn latest_for(&self, contract: &str, min_version: Version) -> StoreResult<Vec<AttachmentId>> {
        let versions = self.versions(contract)?;
        let newest = versions.range(min_version..).rev();
        let latest = AttachmentIds {
            signed: newest.clone().find_map(|(_, ids)| ids.signed),
            unsigned: newest.clone().find_map(|(_, ids)| ids.unsigned),
        };
        Ok(latest.to_vec())
    }

    pub fn invalidate(&self, contract: &str) {
        self.cache.invalidate(&contract.to_string());
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl std::fmt::Debug for VersionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionIndex")
            .field("cache", &self.cache)
            .field("dev_mode", &self.dev_mode)
            .finish()
    }
}

/// Group rows by version. Rows arrive most recently inserted first within a
/// version, so the first of each kind is kept.
fn build_versions(contract: &str, rows: &[AttachmentRecord], dev_mode: bool) -> VersionMap {
    let mut grouped: BTreeMap<Version, (Vec<AttachmentId>, Vec<AttachmentId>)> = BTreeMap::new();
    for row in rows {
        let (signed, unsigned) = grouped.entry(row.version).or_default();
        if row.is_signed() {
            signed.push(row.id);
        } else {
            unsigned.push(row.id);
        }
    }

    grouped
        .into_iter()
        .map(|(version, (signed, unsigned))| {
            if signed.len() > 1 {
                let ids: Vec<String> = signed.iter().map(ToString::to_string).collect();
                if dev_mode {
                    warn!(contract, version, ?ids, "multiple signed attachments for one version (dev mode)");
                } else {
                    error!(contract, version, ?ids, "consistency fault: multiple signed attachments for one version");
                }
            }
            if unsigned.len() > 1 {
                let ids: Vec<String> = unsigned.iter().map(ToString::to_string).collect();
                warn!(contract, version, selected = %unsigned[0], ?ids, "selecting newest of duplicated unsigned attachments");
            }
            let ids = AttachmentIds {
                signed: signed.first().copied(),
                unsigned: unsigned.first().copied(),
            };
            (version, ids)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use bytes::Bytes;
    use chrono::Utc;
    use vault_crypto::AttachmentHasher;
    use vault_store::InMemoryAttachmentStorage;
    use vault_types::SignerKey;

    use super::*;

    fn row(content: &[u8], version: Version, uploader: &str, signed: bool) -> AttachmentRecord {
        AttachmentRecord {
            id: AttachmentHasher::SHA256.hash(content),
            content: Bytes::copy_from_slice(content),
            inserted_at: Utc::now(),
            uploader: Some(uploader.into()),
            filename: None,
            contract_class_names: vec!["c.C".into()],
            signers: if signed {
                BTreeSet::from([SignerKey::from_bytes([9; 32])])
            } else {
                BTreeSet::new()
            },
            version,
        }
    }

    fn index_over(rows: &[AttachmentRecord], dev_mode: bool) -> VersionIndex {
        let storage = Arc::new(InMemoryAttachmentStorage::new());
        for r in rows {
            storage.insert(r.clone()).unwrap();
        }
        VersionIndex::new(storage, 16, dev_mode)
    }

    #[test]
    fn latest_signed_and_unsigned() {
        let signed_v3 = row(b"signed v3", 3, "app", true);
        let unsigned_v5 = row(b"unsigned v5", 5, "app", false);
        let index = index_over(&[row(b"signed v1", 1, "app", true), signed_v3.clone(), unsigned_v5.clone()], false);

        assert_eq!(index.latest_for("c.C", 1).unwrap(), vec![signed_v3.id, unsigned_v5.id]);
        assert_eq!(index.latest_for("c.C", 4).unwrap(), vec![unsigned_v5.id]);
        assert!(index.latest_for("c.C", 6).unwrap().is_empty());
        assert!(index.latest_for("other", 1).unwrap().is_empty());
    }

    #[test]
    fn untrusted_rows_are_not_indexed() {
        let peer = row(b"from a peer", 9, "p2p:bank", true);
        let index = index_over(&[peer], false);
        assert!(index.versions("c.C").unwrap().is_empty());
    }

    #[test]
    fn duplicate_signed_rows_are_reported_not_raised() {
        let a = row(b"first signed", 2, "app", true);
        let b = row(b"second signed", 2, "rpc", true);
        let index = index_over(&[a, b], false);
        let versions = index.versions("c.C").unwrap();
        assert!(versions[&2].signed.is_some());
        assert_eq!(index.latest_for("c.C", 1).unwrap().len(), 1);
    }

    #[test]
    fn versions_are_cached_until_invalidated() {
        let storage = Arc::new(InMemoryAttachmentStorage::new());
        let index = VersionIndex::new(storage.clone(), 16, false);
        assert!(index.latest_for("c.C", 1).unwrap().is_empty());
        assert_eq!(index.stats().entries, 1);

        let late = row(b"late", 2, "app", false);
        storage.insert(late.clone()).unwrap();
        assert!(index.latest_for("c.C", 1).unwrap().is_empty());

        index.invalidate("c.C");
        assert_eq!(index.latest_for("c.C", 1).unwrap(), vec![late.id]);
    }

    #[test]
    fn ids_list_signed_first() {
        let s = AttachmentId::new(vault_types::DigestAlgorithm::Sha256, [1; 32]);
        let u = AttachmentId::new(vault_types::DigestAlgorithm::Sha256, [2; 32]);
        let both = AttachmentIds {
            signed: Some(s),
            unsigned: Some(u),
        };
        assert_eq!(both.to_vec(), vec![s, u]);
        assert_eq!(AttachmentIds::default().to_vec(), Vec::<AttachmentId>::new());
    }
}
