//! Uploader tokens and their trust classes.
//!
//! An uploader string records where an attachment came from. A handful of
//! values are reserved: they can only be assigned by internal call paths,
//! never by an importing caller. Two of them are *trusted* and are the only
//! provenance honoured by version-uniqueness checks and latest-version
//! queries.

/// Attachment installed from a locally deployed application.
pub const DEPLOYED_APP_UPLOADER: &str = "app";
/// Attachment imported through the node's client interface.
pub const RPC_UPLOADER: &str = "rpc";
/// Attachment delivered by a peer. Peer imports use `p2p:<peer>`.
pub const P2P_UPLOADER: &str = "p2p";
/// Provenance not recorded.
pub const UNKNOWN_UPLOADER: &str = "unknown";

/// Tokens honoured by uniqueness checks and latest-version queries.
pub const TRUSTED_UPLOADERS: [&str; 2] = [DEPLOYED_APP_UPLOADER, RPC_UPLOADER];

/// Trust class of an uploader token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploaderClass {
    DeployedApp,
    Rpc,
    PeerDelivered,
    Unknown,
    /// Arbitrary caller-supplied string.
    Custom,
}

impl UploaderClass {
    pub fn of(uploader: &str) -> Self {
        match uploader {
            DEPLOYED_APP_UPLOADER => Self::DeployedApp,
            RPC_UPLOADER => Self::Rpc,
            UNKNOWN_UPLOADER => Self::Unknown,
            P2P_UPLOADER => Self::PeerDelivered,
            u if is_peer_delivered(u) => Self::PeerDelivered,
            _ => Self::Custom,
        }
    }

    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::DeployedApp | Self::Rpc)
    }

    /// Reserved classes can only be assigned by internal call paths.
    pub fn is_reserved(&self) -> bool {
        !matches!(self, Self::Custom)
    }
}

/// Returns `true` if the uploader is in the trusted set.
pub fn is_trusted(uploader: Option<&str>) -> bool {
    uploader.is_some_and(|u| UploaderClass::of(u).is_trusted())
}

/// Returns `true` for the namespaced `p2p:<peer>` form.
pub fn is_peer_delivered(uploader: &str) -> bool {
    uploader
        .strip_prefix(P2P_UPLOADER)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// Build the namespaced uploader token for an attachment fetched from `peer`.
pub fn peer_uploader(peer: &str) -> String {
    format!("{P2P_UPLOADER}:{peer}")
}
