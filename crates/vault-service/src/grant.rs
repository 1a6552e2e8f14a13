/// Capability to import attachments attributed to a peer (`p2p:<peer>`).
///
/// Issued once per [`AttachmentService`](crate::AttachmentService) through
/// [`take_peer_fetch_grant`](crate::AttachmentService::take_peer_fetch_grant)
/// and handed to the component that fetches attachments from peers. A grant
/// is only honoured by the service that issued it.
#[derive(Debug)]
pub struct PeerFetchGrant {
    pub(crate) service: u64,
}

impl PeerFetchGrant {
    pub(crate) fn new(service: u64) -> Self {
        Self { service }
    }
}
