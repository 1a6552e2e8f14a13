//! Cryptographic primitives for the attachment vault.
//!
//! Provides content digests for attachment ids (BLAKE3 or SHA-256), a reader
//! that verifies a stream against its expected digest, and Ed25519 keys used
//! to sign archives.
//!
//! All crypto operations wrap established libraries -- no custom cryptography.

pub mod hasher;
pub mod signer;
pub mod verify;

pub use hasher::{AttachmentHasher, RunningDigest};
pub use signer::{verify_signature, Signature, SignatureError, SigningKey};
pub use verify::{HashVerifyingReader, IntegrityFault};
