use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};
use vault_archive::{ContractScanner, ManifestScanner};
use vault_cache::{Attachment, AttachmentCache, AttachmentCacheStats, CacheStats};
use vault_crypto::{AttachmentHasher, IntegrityFault};
use vault_store::{AttachmentQuery, AttachmentSort, AttachmentStorage};
use vault_types::{uploader, AttachmentId, UploaderClass, Version};

use crate::config::VaultConfig;
use crate::error::{AttachmentError, AttachmentResult};
use crate::grant::PeerFetchGrant;
use crate::import::{ImportPipeline, OnDuplicate};
use crate::index::VersionIndex;
use crate::whitelist::{ContractWhitelist, StaticWhitelist};

static NEXT_SERVICE: AtomicU64 = AtomicU64::new(1);

/// Counters of every cache owned by the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceCacheStats {
    pub attachments: AttachmentCacheStats,
    pub versions: CacheStats,
}

/// Content-addressed attachment store.
///
/// Entry point for importing, opening and querying attachments. All methods
/// take `&self` and may be called from many threads at once.
pub struct AttachmentService {
    config: VaultConfig,
    storage: Arc<dyn AttachmentStorage>,
    cache: Arc<AttachmentCache>,
    index: Arc<VersionIndex>,
    pipeline: ImportPipeline,
    instance: u64,
    grant_issued: AtomicBool,
}

impl AttachmentService {
    /// Create a service over `storage` that reads contract metadata from
    /// archive manifests and has an empty whitelist.
    pub fn new(storage: Arc<dyn AttachmentStorage>, config: VaultConfig) -> Self {
        let cache = Arc::new(AttachmentCache::new(
            Arc::clone(&storage),
            config.cache_limits(),
            config.verify_on_load,
        ));
        let index = Arc::new(VersionIndex::new(
            Arc::clone(&storage),
            config.version_cache_max_entries,
            config.dev_mode,
        ));
        let pipeline = ImportPipeline::new(
            Arc::clone(&storage),
            Arc::clone(&cache),
            Arc::clone(&index),
            Box::new(ManifestScanner),
            Arc::new(StaticWhitelist::new()),
            AttachmentHasher::new(config.digest),
            config.signer_policy,
            config.dev_mode,
        );
        match storage.count() {
            Ok(count) => info!(attachments = count, dev_mode = config.dev_mode, "attachment service started"),
            Err(e) => warn!(error = %e, "attachment service started; could not count attachments"),
        }
        Self {
            config,
            storage,
            cache,
            index,
            pipeline,
            instance: NEXT_SERVICE.fetch_add(1, Ordering::Relaxed),
            grant_issued: AtomicBool::new(false),
        }
    }

    /// Use `whitelist` for default version inference.
    pub fn with_whitelist(mut self, whitelist: Arc<dyn ContractWhitelist>) -> Self {
        self.pipeline.whitelist = whitelist;
        self
    }

    /// Use `scanner` to read contract metadata from archives.
    pub fn with_scanner(mut self, scanner: Box<dyn ContractScanner>) -> Self {
        self.pipeline.scanner = scanner;
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Import an attachment on behalf of an external caller.
    ///
    /// Fails with [`AttachmentError::RejectedUploaderToken`] if `uploader` is
    /// reserved or claims peer provenance, and with
    /// [`AttachmentError::DuplicateAttachment`] if the content is already
    /// stored and cannot be re-attributed to `uploader`.
    pub fn import_attachment(
        &self,
        content: impl Into<Bytes>,
        uploader: &str,
        filename: Option<&str>,
    ) -> AttachmentResult<AttachmentId> {
        if UploaderClass::of(uploader).is_reserved() {
            return Err(AttachmentError::RejectedUploaderToken {
                uploader: uploader.to_string(),
            });
        }
        self.pipeline
            .import(content.into(), uploader, filename, OnDuplicate::Fail)
    }

    /// Import an attachment received from `peer`, attributed as `p2p:<peer>`.
    pub fn import_peer_attachment(
        &self,
        grant: &PeerFetchGrant,
        peer: &str,
        content: impl Into<Bytes>,
        filename: Option<&str>,
    ) -> AttachmentResult<AttachmentId> {
        let attributed = uploader::peer_uploader(peer);
        if grant.service != self.instance || peer.is_empty() {
            return Err(AttachmentError::RejectedUploaderToken {
                uploader: attributed,
            });
        }
        self.pipeline
            .import(content.into(), &attributed, filename, OnDuplicate::Fail)
    }

    /// Import without the reserved uploader check. For node-internal callers.
    pub fn privileged_import_attachment(
        &self,
        content: impl Into<Bytes>,
        uploader: &str,
        filename: Option<&str>,
    ) -> AttachmentResult<AttachmentId> {
        self.pipeline
            .import(content.into(), uploader, filename, OnDuplicate::Fail)
    }

    /// Like [`privileged_import_attachment`](Self::privileged_import_attachment),
    /// but returns the existing id instead of failing on a duplicate.
    pub fn privileged_import_or_get_attachment(
        &self,
        content: impl Into<Bytes>,
        uploader: &str,
        filename: Option<&str>,
    ) -> AttachmentResult<AttachmentId> {
        self.pipeline
            .import(content.into(), uploader, filename, OnDuplicate::ReturnExisting)
    }

    /// Import attributed to the `unknown` uploader.
    pub fn import_attachment_unattributed(&self, content: impl Into<Bytes>) -> AttachmentResult<AttachmentId> {
        self.pipeline
            .import(content.into(), uploader::UNKNOWN_UPLOADER, None, OnDuplicate::Fail)
    }

    /// Import attributed to the `unknown` uploader, returning the existing id
    /// if the content is already stored.
    pub fn import_or_get_attachment(&self, content: impl Into<Bytes>) -> AttachmentResult<AttachmentId> {
        self.pipeline.import(
            content.into(),
            uploader::UNKNOWN_UPLOADER,
            None,
            OnDuplicate::ReturnExisting,
        )
    }

    /// Hand out the peer fetch capability. Only the first call gets it.
    pub fn take_peer_fetch_grant(&self) -> Option<PeerFetchGrant> {
        if self.grant_issued.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(PeerFetchGrant::new(self.instance))
        }
    }

    pub fn open_attachment(&self, id: &AttachmentId) -> AttachmentResult<Option<Attachment>> {
        Ok(self.cache.open(id)?)
    }

    /// Full content of `id`, checked against the id when verification is on.
    pub fn read_attachment(&self, id: &AttachmentId) -> AttachmentResult<Option<Vec<u8>>> {
        let Some(attachment) = self.open_attachment(id)? else {
            return Ok(None);
        };
        let mut reader = attachment.open()?;
        let mut content = Vec::with_capacity(attachment.size());
        if let Err(e) = reader.read_to_end(&mut content) {
            return Err(match IntegrityFault::from_io_error(&e) {
                Some(fault) => fault.clone().into(),
                None => e.into(),
            });
        }
        reader.close()?;
        Ok(Some(content))
    }

    pub fn has_attachment(&self, id: &AttachmentId) -> AttachmentResult<bool> {
        Ok(self.storage.exists(id)?)
    }

    pub fn query_attachments(
        &self,
        query: &AttachmentQuery,
        sort: &AttachmentSort,
    ) -> AttachmentResult<Vec<AttachmentId>> {
        debug!(?query, ?sort, "querying attachments");
        let rows = self.storage.query(query, sort)?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    /// Newest trusted signed and unsigned attachments for `contract` at or
    /// above `min_version`, signed first.
    pub fn get_latest_contract_attachments(
        &self,
        contract: &str,
        min_version: Version,
    ) -> AttachmentResult<Vec<AttachmentId>> {
        Ok(self.index.latest_for(contract, min_version)?)
    }

    pub fn attachment_count(&self) -> AttachmentResult<u64> {
        Ok(self.storage.count()?)
    }

    pub fn cache_stats(&self) -> ServiceCacheStats {
        ServiceCacheStats {
            attachments: self.cache.stats(),
            versions: self.index.stats(),
        }
    }
}

impl std::fmt::Debug for AttachmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentService")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("index", &self.index)
            .finish()
    }
}
