//! Network-wide contract implementation whitelist.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};
use vault_types::{AttachmentId, ContractClassName, Version, DEFAULT_VERSION};

/// Ordered allow-lists of attachments per contract class name.
///
/// Position in a contract's list implies a version: the first entry is
/// version 1, the second version 2, and so on.
pub trait ContractWhitelist: Send + Sync {
    fn allowed(&self, contract: &str) -> Vec<AttachmentId>;
}

/// Whitelist held in memory, typically loaded from network parameters.
#[derive(Clone, Debug, Default)]
pub struct StaticWhitelist {
    entries: HashMap<ContractClassName, Vec<AttachmentId>>,
}

impl StaticWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, contract: impl Into<ContractClassName>, ids: Vec<AttachmentId>) -> Self {
        self.entries.insert(contract.into(), ids);
        self
    }
}

impl ContractWhitelist for StaticWhitelist {
    fn allowed(&self, contract: &str) -> Vec<AttachmentId> {
        self.entries.get(contract).cloned().unwrap_or_default()
    }
}

/// Effective version of an attachment.
///
/// An archive that declares only the default version is promoted to the
/// highest whitelist position (1-based) it holds among its contracts.
pub fn infer_version(
    whitelist: &dyn ContractWhitelist,
    id: &AttachmentId,
    contracts: &[ContractClassName],
    declared: Version,
) -> Version {
    if declared != DEFAULT_VERSION {
        return declared;
    }
    let candidates: BTreeSet<Version> = contracts
        .iter()
        .filter_map(|contract| {
            whitelist
                .allowed(contract)
                .iter()
                .position(|allowed| allowed == id)
        })
        .map(|position| position as Version + 1)
        .collect();
    let Some(&max) = candidates.last() else {
        return declared;
    };
    if max <= declared {
        return declared;
    }
    if candidates.len() > 1 {
        warn!(%id, from = declared, to = max, ?candidates, "whitelist positions disagree; using highest version");
    } else {
        debug!(%id, from = declared, to = max, "version inferred from whitelist position");
    }
    max
}
