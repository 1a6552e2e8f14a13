//! Attachment vault service.
//!
//! Stores archives by content digest and answers which attachment provides a
//! given contract. Every import runs through one pipeline: hash, dedup,
//! archive validation, signer and contract metadata extraction, signed
//! version uniqueness, then an atomic insert. Reads go through a two-level
//! cache and can verify content against its id as it is streamed.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use vault_archive::ArchiveBuilder;
//! use vault_service::{AttachmentService, VaultConfig};
//! use vault_store::InMemoryAttachmentStorage;
//!
//! let service = AttachmentService::new(
//!     Arc::new(InMemoryAttachmentStorage::new()),
//!     VaultConfig::default(),
//! );
//! let jar = ArchiveBuilder::new()
//!     .contracts(["com.acme.Cash"])
//!     .version(2)
//!     .entry("com/acme/Cash.class", vec![0xca, 0xfe])
//!     .build()
//!     .unwrap();
//! let id = service.privileged_import_attachment(jar.clone(), "app", Some("cash.jar")).unwrap();
//! assert_eq!(service.read_attachment(&id).unwrap(), Some(jar));
//! assert_eq!(service.get_latest_contract_attachments("com.acme.Cash", 1).unwrap(), vec![id]);
//! ```

pub mod config;
pub mod error;
pub mod grant;
mod import;
pub mod index;
pub mod service;
pub mod whitelist;

// Re-exports for convenience.
pub use config::VaultConfig;
pub use error::{AttachmentError, AttachmentResult};
pub use grant::PeerFetchGrant;
pub use index::{AttachmentIds, VersionIndex, VersionMap};
pub use service::{AttachmentService, ServiceCacheStats};
pub use whitelist::{infer_version, ContractWhitelist, StaticWhitelist};
