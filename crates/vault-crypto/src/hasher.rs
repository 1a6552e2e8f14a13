use sha2::Digest;
use vault_types::{AttachmentId, DigestAlgorithm};

/// Computes attachment ids from raw archive bytes.
///
/// Ids are plain digests of the bytes (no domain tag) so that an id can be
/// checked with any standard tool for the algorithm, e.g. `sha256sum`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentHasher {
    algorithm: DigestAlgorithm,
}

impl AttachmentHasher {
    pub const BLAKE3: Self = Self {
        algorithm: DigestAlgorithm::Blake3,
    };
    pub const SHA256: Self = Self {
        algorithm: DigestAlgorithm::Sha256,
    };

    pub const fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Hash a complete byte buffer.
    pub fn hash(&self, data: &[u8]) -> AttachmentId {
        let mut running = self.running();
        running.update(data);
        running.finalize()
    }

    /// Verify that data produces the expected id.
    pub fn verify(&self, data: &[u8], expected: &AttachmentId) -> bool {
        expected.algorithm() == self.algorithm && self.hash(data) == *expected
    }

    /// Start an incremental digest.
    pub fn running(&self) -> RunningDigest {
        RunningDigest::new(self.algorithm)
    }

    /// Raw BLAKE3 hash, used for per-entry digests inside archives.
    pub fn raw_blake3(data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }
}

impl From<DigestAlgorithm> for AttachmentHasher {
    fn from(algorithm: DigestAlgorithm) -> Self {
        Self::new(algorithm)
    }
}

/// An in-progress digest over a byte stream.
pub enum RunningDigest {
    Blake3(Box<blake3::Hasher>),
    Sha256(sha2::Sha256),
}

impl RunningDigest {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Blake3(h) => {
                h.update(data);
            }
            Self::Sha256(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> AttachmentId {
        match self {
            Self::Blake3(h) => AttachmentId::new(DigestAlgorithm::Blake3, *h.finalize().as_bytes()),
            Self::Sha256(h) => {
                let mut digest = [0u8; 32];
                digest.copy_from_slice(&h.finalize());
                AttachmentId::new(DigestAlgorithm::Sha256, digest)
            }
        }
    }
}

impl std::fmt::Debug for RunningDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blake3(_) => write!(f, "RunningDigest(BLAKE3)"),
            Self::Sha256(_) => write!(f, "RunningDigest(SHA256)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let id1 = AttachmentHasher::SHA256.hash(b"hello world");
        let id2 = AttachmentHasher::SHA256.hash(b"hello world");
        assert_eq!(id1, id2);
    }

    #[test]
    fn sha256_matches_known_vector() {
        let id = AttachmentHasher::SHA256.hash(b"abc");
        assert_eq!(
            id.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn blake3_matches_library() {
        let id = AttachmentHasher::BLAKE3.hash(b"abc");
        assert_eq!(id.digest(), blake3::hash(b"abc").as_bytes());
        assert_eq!(id.algorithm(), DigestAlgorithm::Blake3);
    }

    #[test]
    fn incremental_equals_one_shot() {
        for hasher in [AttachmentHasher::BLAKE3, AttachmentHasher::SHA256] {
            let mut running = hasher.running();
            running.update(b"hello ");
            running.update(b"world");
            assert_eq!(running.finalize(), hasher.hash(b"hello world"));
        }
    }

    #[test]
    fn verify_rejects_tampered_data() {
        let id = AttachmentHasher::BLAKE3.hash(b"original");
        assert!(AttachmentHasher::BLAKE3.verify(b"original", &id));
        assert!(!AttachmentHasher::BLAKE3.verify(b"tampered", &id));
    }

    #[test]
    fn verify_rejects_algorithm_mismatch() {
        let id = AttachmentHasher::BLAKE3.hash(b"data");
        assert!(!AttachmentHasher::SHA256.verify(b"data", &id));
    }
}
