use std::collections::BTreeSet;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;
use vault_crypto::{HashVerifyingReader, IntegrityFault};
use vault_store::{StoreError, StoreResult};
use vault_types::{AttachmentId, AttachmentKind, AttachmentMetadata, ContractInfo, SignerKey};

/// Where an [`Attachment`] handle gets its bytes from.
pub trait ContentSource: Send + Sync {
    /// Content for `id`, or `None` if it is not stored.
    fn load_content(&self, id: &AttachmentId) -> StoreResult<Option<Bytes>>;

    /// Forget any cached content for `id`.
    fn evict_content(&self, id: &AttachmentId);
}

/// Handle to a stored attachment.
///
/// Holds metadata only. Bytes are fetched from the content source on
/// [`open`](Self::open), so a handle stays cheap to cache and to clone.
#[derive(Clone)]
pub struct Attachment {
    metadata: Arc<AttachmentMetadata>,
    source: Arc<dyn ContentSource>,
    verify_on_open: bool,
}

impl Attachment {
    pub fn new(
        metadata: Arc<AttachmentMetadata>,
        source: Arc<dyn ContentSource>,
        verify_on_open: bool,
    ) -> Self {
        Self {
            metadata,
            source,
            verify_on_open,
        }
    }

    pub fn id(&self) -> AttachmentId {
        self.metadata.id
    }

    pub fn metadata(&self) -> &AttachmentMetadata {
        &self.metadata
    }

    pub fn kind(&self) -> &AttachmentKind {
        &self.metadata.kind
    }

    pub fn contract(&self) -> Option<&ContractInfo> {
        self.metadata.contract()
    }

    pub fn size(&self) -> usize {
        self.metadata.size
    }

    pub fn uploader(&self) -> Option<&str> {
        self.metadata.uploader.as_deref()
    }

    pub fn signers(&self) -> BTreeSet<SignerKey> {
        self.metadata.signers()
    }

    /// Open a fresh reader over the content.
    ///
    /// When verification is enabled the reader checks the digest once fully
    /// consumed, and a mismatch evicts the cached content.
    pub fn open(&self) -> StoreResult<AttachmentReader> {
        let id = self.id();
        let bytes = self
            .source
            .load_content(&id)?
            .ok_or(StoreError::NotFound(id))?;
        let len = bytes.len() as u64;
        let inner = if self.verify_on_open {
            ReaderKind::Verified(HashVerifyingReader::new(Cursor::new(bytes), id, len))
        } else {
            ReaderKind::Plain(Cursor::new(bytes))
        };
        Ok(AttachmentReader {
            id,
            inner,
            source: Arc::clone(&self.source),
        })
    }

    /// Read the whole content through [`open`](Self::open).
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut reader = self.open().map_err(io::Error::other)?;
        let mut out = Vec::with_capacity(self.size());
        reader.read_to_end(&mut out)?;
        reader.close()?;
        Ok(out)
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("id", &self.metadata.id)
            .field("size", &self.metadata.size)
            .field("kind", &self.metadata.kind)
            .finish()
    }
}

enum ReaderKind {
    Plain(Cursor<Bytes>),
    Verified(HashVerifyingReader<Cursor<Bytes>>),
}

/// Reader returned by [`Attachment::open`].
pub struct AttachmentReader {
    id: AttachmentId,
    inner: ReaderKind,
    source: Arc<dyn ContentSource>,
}

impl AttachmentReader {
    pub fn id(&self) -> AttachmentId {
        self.id
    }

    /// Finish reading, verifying the digest if the content was fully read.
    pub fn close(&mut self) -> Result<(), IntegrityFault> {
        match &mut self.inner {
            ReaderKind::Plain(_) => Ok(()),
            ReaderKind::Verified(reader) => {
                let result = reader.close();
                if let Err(fault) = &result {
                    self.on_fault(fault);
                }
                result
            }
        }
    }

    fn on_fault(&self, fault: &IntegrityFault) {
        warn!(id = %self.id, actual = %fault.actual, "integrity fault on read; evicting cached content");
        self.source.evict_content(&self.id);
    }
}

impl Read for AttachmentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = match &mut self.inner {
            ReaderKind::Plain(reader) => reader.read(buf),
            ReaderKind::Verified(reader) => reader.read(buf),
        };
        if let Err(err) = &result {
            if let Some(fault) = IntegrityFault::from_io_error(err) {
                self.on_fault(fault);
            }
        }
        result
    }
}

impl std::fmt::Debug for AttachmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentReader")
            .field("id", &self.id)
            .field("verified", &matches!(self.inner, ReaderKind::Verified(_)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;
    use vault_crypto::AttachmentHasher;

    use super::*;

    #[derive(Default)]
    struct FixedSource {
        content: Mutex<HashMap<AttachmentId, Bytes>>,
        evicted: Mutex<Vec<AttachmentId>>,
    }

    impl ContentSource for FixedSource {
        fn load_content(&self, id: &AttachmentId) -> StoreResult<Option<Bytes>> {
            Ok(self.content.lock().unwrap().get(id).cloned())
        }

        fn evict_content(&self, id: &AttachmentId) {
            self.evicted.lock().unwrap().push(*id);
        }
    }

    fn handle(source: &Arc<FixedSource>, id: AttachmentId, size: usize, verify: bool) -> Attachment {
        let metadata = AttachmentMetadata {
            id,
            size,
            inserted_at: Utc::now(),
            uploader: Some("app".into()),
            filename: None,
            kind: AttachmentKind::Plain,
        };
        Attachment::new(Arc::new(metadata), source.clone(), verify)
    }

    #[test]
    fn reads_intact_content() {
        let source = Arc::new(FixedSource::default());
        let id = AttachmentHasher::BLAKE3.hash(b"payload");
        source.content.lock().unwrap().insert(id, Bytes::from_static(b"payload"));
        let attachment = handle(&source, id, 7, true);
        assert_eq!(attachment.read_all().unwrap(), b"payload");
        assert!(source.evicted.lock().unwrap().is_empty());
    }

    #[test]
    fn corrupted_content_faults_and_evicts() {
        let source = Arc::new(FixedSource::default());
        let id = AttachmentHasher::BLAKE3.hash(b"payload");
        source.content.lock().unwrap().insert(id, Bytes::from_static(b"pAyload"));
        let attachment = handle(&source, id, 7, true);

        let err = attachment.read_all().unwrap_err();
        let fault = IntegrityFault::from_io_error(&err).unwrap();
        assert_eq!(fault.expected, id);
        assert_eq!(*source.evicted.lock().unwrap(), vec![id]);
    }

    #[test]
    fn unverified_reader_passes_bytes_through() {
        let source = Arc::new(FixedSource::default());
        let id = AttachmentHasher::BLAKE3.hash(b"payload");
        source.content.lock().unwrap().insert(id, Bytes::from_static(b"garbage"));
        let attachment = handle(&source, id, 7, false);
        assert_eq!(attachment.read_all().unwrap(), b"garbage");
    }

    #[test]
    fn partial_read_is_not_checked() {
        let source = Arc::new(FixedSource::default());
        let id = AttachmentHasher::BLAKE3.hash(b"payload");
        source.content.lock().unwrap().insert(id, Bytes::from_static(b"pAyload"));
        let mut reader = handle(&source, id, 7, true).open().unwrap();
        let mut head = [0u8; 3];
        reader.read_exact(&mut head).unwrap();
        assert!(reader.close().is_ok());
    }

    #[test]
    fn missing_content_is_not_found() {
        let source = Arc::new(FixedSource::default());
        let id = AttachmentHasher::BLAKE3.hash(b"gone");
        let err = handle(&source, id, 4, true).open().unwrap_err();
        assert_eq!(err, StoreError::NotFound(id));
    }
}
