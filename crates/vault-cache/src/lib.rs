//! # vault-cache
//!
//! Read-through caching in front of the attachment store.
//!
//! [`SingleFlightCache`] is the building block: concurrent misses on one key
//! share a single load, misses are never remembered, and entries are evicted
//! least-recently-used once a weight budget is exceeded.
//!
//! [`AttachmentCache`] stacks two of them: content bytes weighed by size, and
//! [`Attachment`] handles weighed per entry. Handles re-read their bytes
//! through the content level and can verify the digest as they are read.

pub mod attachment;
pub mod single_flight;
pub mod two_level;

pub use attachment::{Attachment, AttachmentReader, ContentSource};
pub use single_flight::{CacheStats, Lookup, SingleFlightCache};
pub use two_level::{AttachmentCache, AttachmentCacheStats, CacheLimits};
