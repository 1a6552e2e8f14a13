//! Archive inspection for the attachment vault.
//!
//! Attachments arrive as untrusted ZIP/JAR-shaped blobs. This crate performs
//! the narrow set of checks the vault needs before storing one:
//!
//! - [`validate_archive`] -- entry directory sanity and path-traversal defense
//! - [`extract_signers`] -- keys that co-sign every content entry
//! - [`ManifestScanner`] -- declared contract class names and version
//! - [`ArchiveBuilder`] -- assembles (optionally signed) archives for tooling and tests
//!
//! It is not a general-purpose ZIP library.

pub mod builder;
pub mod error;
pub mod manifest;
pub mod signing;
pub mod validate;

pub use builder::ArchiveBuilder;
pub use error::{ArchiveError, ArchiveResult};
pub use manifest::{ContractMetadata, ContractScanner, ManifestScanner};
pub use signing::{extract_signers, SignatureBlock, SignerPolicy};
pub use validate::{validate_archive, validate_entry_name};
