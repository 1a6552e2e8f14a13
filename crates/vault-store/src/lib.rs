//! Durable storage boundary for the attachment vault.
//!
//! The persistence engine itself is external; this crate defines the
//! transactional adapter the vault talks to and ships an in-memory engine.
//! Every attachment is one row keyed by the digest of its content.
//!
//! # Storage Backends
//!
//! All backends implement the [`AttachmentStorage`] trait:
//!
//! - [`InMemoryAttachmentStorage`] -- `HashMap`-based table for tests and embedding
//!
//! # Design Rules
//!
//! 1. Content is immutable once written; `uploader` is the only mutable column.
//! 2. `insert` is atomic and never overwrites: a second insert of the same id
//!    fails with [`StoreError::AlreadyExists`].
//! 3. Rows are never deleted.
//! 4. The store never interprets archive contents.
//! 5. All backend errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod query;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryAttachmentStorage;
pub use query::{AttachmentQuery, AttachmentSort, Direction, Predicate, SortAttribute};
pub use traits::AttachmentStorage;
