use std::io::{self, Read};

use vault_types::AttachmentId;

use crate::hasher::RunningDigest;

/// Stored content no longer hashes to its id.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("attachment {expected} hashed to {actual}: corruption in attachment store?")]
pub struct IntegrityFault {
    pub expected: AttachmentId,
    pub actual: AttachmentId,
}

impl IntegrityFault {
    /// Recover a fault raised through [`std::io::Read`].
    pub fn from_io_error(err: &io::Error) -> Option<&IntegrityFault> {
        err.get_ref()?.downcast_ref::<IntegrityFault>()
    }
}

impl From<IntegrityFault> for io::Error {
    fn from(fault: IntegrityFault) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, fault)
    }
}

/// Wraps a stream and hashes data as it is read.
///
/// If the entire stream is consumed, the digest of the read data is compared
/// with the expected id at end-of-stream (a `read` returning 0) or on
/// [`close`](Self::close), and an [`IntegrityFault`] is raised on mismatch.
/// A stream that is only partially read is never checked: callers that skip
/// around inside the content get no guarantee.
pub struct HashVerifyingReader<R> {
    inner: R,
    expected: AttachmentId,
    expected_len: u64,
    consumed: u64,
    digest: Option<RunningDigest>,
    verdict: Option<Result<(), IntegrityFault>>,
}

impl<R: Read> HashVerifyingReader<R> {
    pub fn new(inner: R, expected: AttachmentId, expected_len: u64) -> Self {
        Self {
            inner,
            expected,
            expected_len,
            consumed: 0,
            digest: Some(RunningDigest::new(expected.algorithm())),
            verdict: None,
        }
    }

    /// Finish reading. Verifies the digest if the stream was fully consumed.
    pub fn close(&mut self) -> Result<(), IntegrityFault> {
        self.validate()
    }

    fn validate(&mut self) -> Result<(), IntegrityFault> {
        if self.consumed != self.expected_len {
            return Ok(());
        }
        if let Some(verdict) = &self.verdict {
            return verdict.clone();
        }
        let verdict = match self.digest.take() {
            Some(digest) => {
                let actual = digest.finalize();
                if actual == self.expected {
                    Ok(())
                } else {
                    Err(IntegrityFault {
                        expected: self.expected,
                        actual,
                    })
                }
            }
            None => Ok(()),
        };
        self.verdict = Some(verdict.clone());
        verdict
    }
}

impl<R: Read> Read for HashVerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !buf.is_empty() {
                self.validate()?;
            }
            return Ok(0);
        }
        if let Some(digest) = self.digest.as_mut() {
            digest.update(&buf[..n]);
        }
        self.consumed += n as u64;
        Ok(n)
    }
}

impl<R> std::fmt::Debug for HashVerifyingReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashVerifyingReader")
            .field("expected", &self.expected)
            .field("expected_len", &self.expected_len)
            .field("consumed", &self.consumed)
            .finish()
    }
}
