//! The import pipeline.
//!
//! An import hashes the content, and then either stores it as a new row or
//! treats it as a re-import of an existing one. New rows go through archive
//! validation, signer extraction, contract metadata scanning and, for signed
//! archives, contract version uniqueness. Re-imports may only change the
//! uploader, and only towards a trusted one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info};
use vault_archive::{extract_signers, validate_archive, ContractScanner, SignerPolicy};
use vault_cache::{Attachment, AttachmentCache};
use vault_crypto::AttachmentHasher;
use vault_store::{AttachmentQuery, AttachmentSort, AttachmentStorage, Predicate, StoreError};
use vault_types::{
    AttachmentId, AttachmentRecord, ContractClassName, DigestAlgorithm, UploaderClass, Version,
};

use crate::error::{AttachmentError, AttachmentResult};
use crate::index::VersionIndex;
use crate::whitelist::{infer_version, ContractWhitelist};

/// What to do when the content is already stored and cannot be re-attributed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OnDuplicate {
    Fail,
    ReturnExisting,
}

type Slot = (ContractClassName, Version);

pub(crate) struct ImportPipeline {
    storage: Arc<dyn AttachmentStorage>,
    cache: Arc<AttachmentCache>,
    index: Arc<VersionIndex>,
    pub(crate) scanner: Box<dyn ContractScanner>,
    pub(crate) whitelist: Arc<dyn ContractWhitelist>,
    hasher: AttachmentHasher,
    signer_policy: SignerPolicy,
    dev_mode: bool,
    /// Signed contract versions being imported by trusted uploaders right now.
    reserved: Mutex<HashMap<Slot, AttachmentId>>,
}

impl ImportPipeline {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        storage: Arc<dyn AttachmentStorage>,
        cache: Arc<AttachmentCache>,
        index: Arc<VersionIndex>,
        scanner: Box<dyn ContractScanner>,
        whitelist: Arc<dyn ContractWhitelist>,
        hasher: AttachmentHasher,
        signer_policy: SignerPolicy,
        dev_mode: bool,
    ) -> Self {
        Self {
            storage,
            cache,
            index,
            scanner,
            whitelist,
            hasher,
            signer_policy,
            dev_mode,
            reserved: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn import(
        &self,
        content: Bytes,
        uploader: &str,
        filename: Option<&str>,
        on_duplicate: OnDuplicate,
    ) -> AttachmentResult<AttachmentId> {
        let id = self.hasher.hash(&content);
        let outcome = match self.find_stored(id, &content)? {
            Some(existing) => self.reimport(&existing, uploader),
            None => self.import_new(id, content, uploader, filename),
        };
        match (outcome, on_duplicate) {
            (Err(AttachmentError::DuplicateAttachment(existing)), OnDuplicate::ReturnExisting) => {
                debug!(id = %existing, uploader, "attachment already stored; returning existing id");
                Ok(existing)
            }
            (outcome, _) => outcome,
        }
    }

    /// The stored attachment with this content under any digest algorithm.
    ///
    /// Rows keep the id they were imported under, so content stored before
    /// the configured digest changed is still recognised.
    fn find_stored(&self, id: AttachmentId, content: &[u8]) -> AttachmentResult<Option<Attachment>> {
        if let Some(existing) = self.cache.open(&id)? {
            return Ok(Some(existing));
        }
        for algorithm in DigestAlgorithm::ALL {
            if algorithm == id.algorithm() {
                continue;
            }
            let stored = AttachmentHasher::new(algorithm).hash(content);
            if self.storage.exists(&stored)? {
                debug!(%id, %stored, "content already stored under another digest");
                return Ok(self.cache.open(&stored)?);
            }
        }
        Ok(None)
    }

    fn import_new(
        &self,
        id: AttachmentId,
        content: Bytes,
        uploader: &str,
        filename: Option<&str>,
    ) -> AttachmentResult<AttachmentId> {
        validate_archive(&content)?;
        let signers = extract_signers(&content, self.signer_policy)?;
        let metadata = self.scanner.scan(&content)?;
        let contracts = metadata.contract_class_names;
        let version = infer_version(self.whitelist.as_ref(), &id, &contracts, metadata.version);

        let reservation = if self.dev_mode || signers.is_empty() {
            None
        } else {
            let reservation = self.reserve(&contracts, version, id, uploader)?;
            self.check_unique(&contracts, version, id)?;
            Some(reservation)
        };

        let record = AttachmentRecord {
            id,
            content,
            inserted_at: Utc::now(),
            uploader: Some(uploader.to_string()),
            filename: filename.map(str::to_string),
            contract_class_names: contracts.clone(),
            signers,
            version,
        };
        let signed = record.is_signed();
        match self.storage.insert(record) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => {
                drop(reservation);
                debug!(%id, uploader, "lost insert race; treating as re-import");
                self.cache.invalidate(&id);
                let existing = self.cache.open(&id)?.ok_or(StoreError::NotFound(id))?;
                return self.reimport(&existing, uploader);
            }
            Err(e) => return Err(e.into()),
        }
        drop(reservation);

        self.cache.invalidate(&id);
        for contract in &contracts {
            self.index.invalidate(contract);
        }
        info!(%id, uploader, ?filename, ?contracts, version, signed, "stored new attachment");
        Ok(id)
    }

    /// Re-attribute an already stored attachment to a trusted uploader.
    fn reimport(&self, existing: &Attachment, uploader: &str) -> AttachmentResult<AttachmentId> {
        let id = existing.id();
        let trusted = UploaderClass::of(uploader).is_trusted();
        if !trusted || existing.uploader() == Some(uploader) {
            return Err(AttachmentError::DuplicateAttachment(id));
        }

        let contract = existing.contract();
        // Becoming trusted makes a signed row count towards uniqueness, so the
        // slots are held exactly as for a new import.
        let reservation = match contract {
            Some(info) if !self.dev_mode && !info.signers.is_empty() => {
                let contracts: Vec<ContractClassName> = info.all_contracts().cloned().collect();
                let reservation = self.reserve(&contracts, info.version, id, uploader)?;
                self.check_unique(&contracts, info.version, id)?;
                Some(reservation)
            }
            _ => None,
        };

        self.storage.update_uploader(&id, uploader)?;
        drop(reservation);
        info!(%id, from = ?existing.uploader(), to = uploader, "updated attachment uploader");
        if let Some(info) = contract {
            for name in info.all_contracts() {
                self.index.invalidate(name);
            }
        }
        self.cache.refresh(&id)?;
        Ok(id)
    }

    /// Fails if a trusted signed attachment other than `id` already provides
    /// any of `contracts` at `version`.
    fn check_unique(
        &self,
        contracts: &[ContractClassName],
        version: Version,
        id: AttachmentId,
    ) -> AttachmentResult<()> {
        for contract in contracts {
            let query = AttachmentQuery::new()
                .contract_class_name(Predicate::Equal(contract.clone()))
                .version(Predicate::Equal(version))
                .trusted_only()
                .signed(true);
            let existing: Vec<AttachmentId> = self
                .storage
                .query(&query, &AttachmentSort::default())?
                .into_iter()
                .map(|row| row.id)
                .filter(|other| *other != id)
                .collect();
            if !existing.is_empty() {
                return Err(AttachmentError::DuplicateVersionedContract {
                    contract: contract.clone(),
                    version,
                    existing,
                });
            }
        }
        Ok(())
    }

    /// Claim `(contract, version)` slots for a signed import in progress.
    ///
    /// Any signed import conflicts with a slot held for different content.
    /// Only trusted imports hold slots, since only trusted rows count towards
    /// uniqueness once stored.
    fn reserve(
        &self,
        contracts: &[ContractClassName],
        version: Version,
        id: AttachmentId,
        uploader: &str,
    ) -> AttachmentResult<Reservation<'_>> {
        let mut reserved = self.reserved.lock().expect("lock poisoned");
        for contract in contracts {
            let slot = (contract.clone(), version);
            if let Some(other) = reserved.get(&slot) {
                if *other != id {
                    return Err(AttachmentError::DuplicateVersionedContract {
                        contract: contract.clone(),
                        version,
                        existing: vec![*other],
                    });
                }
            }
        }
        let mut held = Vec::new();
        if UploaderClass::of(uploader).is_trusted() {
            for contract in contracts {
                let slot = (contract.clone(), version);
                if !reserved.contains_key(&slot) {
                    reserved.insert(slot.clone(), id);
                    held.push(slot);
                }
            }
        }
        Ok(Reservation {
            reserved: &self.reserved,
            held,
        })
    }
}

/// Releases reserved slots when dropped.
struct Reservation<'a> {
    reserved: &'a Mutex<HashMap<Slot, AttachmentId>>,
    held: Vec<Slot>,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let mut reserved = self.reserved.lock().expect("lock poisoned");
        for slot in &self.held {
            reserved.remove(slot);
        }
    }
}
