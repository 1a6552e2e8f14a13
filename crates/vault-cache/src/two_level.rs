//! Two-level attachment cache.
//!
//! The content level holds `(metadata, bytes)` weighed by size. The presence
//! level holds [`Attachment`] handles weighed one per entry; handles read
//! their bytes back through the content level, so a handle can outlive the
//! content it points at and simply reload it.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;
use vault_store::{AttachmentStorage, StoreError, StoreResult};
use vault_types::{AttachmentId, AttachmentMetadata};

use crate::attachment::{Attachment, ContentSource};
use crate::single_flight::{CacheStats, Lookup, SingleFlightCache};

#[derive(Clone)]
struct CachedContent {
    metadata: Arc<AttachmentMetadata>,
    bytes: Bytes,
}

struct ContentLevel {
    storage: Arc<dyn AttachmentStorage>,
    cache: SingleFlightCache<AttachmentId, CachedContent, StoreError>,
}

impl ContentLevel {
    fn get(&self, id: &AttachmentId) -> StoreResult<Lookup<CachedContent>> {
        self.cache.get_or_load(id, |id| {
            debug!(%id, "loading attachment content from storage");
            let record = self.storage.get(id)?;
            Ok(record
                .map(|record| CachedContent {
                    metadata: Arc::new(record.metadata()),
                    bytes: record.content,
                })
                .into())
        })
    }
}

impl ContentSource for ContentLevel {
    fn load_content(&self, id: &AttachmentId) -> StoreResult<Option<Bytes>> {
        Ok(self.get(id)?.into_option().map(|c| c.bytes))
    }

    fn evict_content(&self, id: &AttachmentId) {
        self.cache.invalidate(id);
    }
}

/// Size limits for [`AttachmentCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLimits {
    pub content_max_bytes: u64,
    pub presence_max_entries: u64,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            content_max_bytes: 64 * 1024 * 1024,
            presence_max_entries: 10_000,
        }
    }
}

/// Snapshot of both levels' counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttachmentCacheStats {
    pub content: CacheStats,
    pub presence: CacheStats,
}

/// Read-through cache of attachments in front of an [`AttachmentStorage`].
pub struct AttachmentCache {
    content: Arc<ContentLevel>,
    presence: SingleFlightCache<AttachmentId, Attachment, StoreError>,
    verify_on_open: bool,
}

impl AttachmentCache {
    pub fn new(storage: Arc<dyn AttachmentStorage>, limits: CacheLimits, verify_on_open: bool) -> Self {
        let content = Arc::new(ContentLevel {
            storage,
            cache: SingleFlightCache::new(
                "attachment-content",
                limits.content_max_bytes,
                |id: &AttachmentId, c: &CachedContent| id.size() as u64 + c.bytes.len() as u64,
            ),
        });
        Self {
            content,
            presence: SingleFlightCache::with_capacity(
                "attachment-presence",
                limits.presence_max_entries,
            ),
            verify_on_open,
        }
    }

    /// The attachment for `id`, or `None` if it is not stored.
    ///
    /// Concurrent calls for the same uncached id share one storage read. A
    /// miss is not remembered, so an attachment imported after a miss is
    /// found by the next call.
    pub fn open(&self, id: &AttachmentId) -> StoreResult<Option<Attachment>> {
        let found = self.presence.get_or_load(id, |id| {
            let content = self.content.get(id)?;
            Ok(content
                .into_option()
                .map(|c| self.handle(c.metadata))
                .into())
        })?;
        Ok(found.into_option())
    }

    fn handle(&self, metadata: Arc<AttachmentMetadata>) -> Attachment {
        let source: Arc<dyn ContentSource> = self.content.clone();
        Attachment::new(metadata, source, self.verify_on_open)
    }

    /// Drop `id` from both levels.
    pub fn invalidate(&self, id: &AttachmentId) {
        self.presence.invalidate(id);
        self.content.cache.invalidate(id);
    }

    /// Reload `id` from storage into both levels.
    ///
    /// Used after a row's mutable columns change so that cached handles
    /// report the new values.
    pub fn refresh(&self, id: &AttachmentId) -> StoreResult<Option<Attachment>> {
        self.invalidate(id);
        let Some(record) = self.content.storage.get(id)? else {
            return Ok(None);
        };
        let metadata = Arc::new(record.metadata());
        self.content.cache.put(
            *id,
            CachedContent {
                metadata: Arc::clone(&metadata),
                bytes: record.content,
            },
        );
        let attachment = self.handle(metadata);
        self.presence.put(*id, attachment.clone());
        debug!(%id, "attachment cache entry refreshed");
        Ok(Some(attachment))
    }

    pub fn stats(&self) -> AttachmentCacheStats {
        AttachmentCacheStats {
            content: self.content.cache.stats(),
            presence: self.presence.stats(),
        }
    }
}

impl std::fmt::Debug for AttachmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentCache")
            .field("content", &self.content.cache)
            .field("presence", &self.presence)
            .field("verify_on_open", &self.verify_on_open)
            .finish()
    }
}
