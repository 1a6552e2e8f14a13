//! Foundation types for the attachment vault.
//!
//! Every other vault crate depends on `vault-types`.
//!
//! # Key Types
//!
//! - [`AttachmentId`] -- content digest of an attachment's raw bytes
//! - [`SignerKey`] -- public key of an archive signer
//! - [`AttachmentRecord`] -- durable row stored per attachment
//! - [`AttachmentMetadata`] / [`AttachmentKind`] -- plain vs. contract-bearing attachments
//! - [`uploader`] -- reserved and trusted uploader tokens

pub mod error;
pub mod id;
pub mod record;
pub mod uploader;

pub use error::TypeError;
pub use id::{AttachmentId, DigestAlgorithm, SignerKey};
pub use record::{
    AttachmentKind, AttachmentMetadata, AttachmentRecord, ContractClassName, ContractInfo,
    Version, DEFAULT_VERSION,
};
pub use uploader::UploaderClass;
