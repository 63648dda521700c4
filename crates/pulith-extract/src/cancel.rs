//! Cooperative cancellation for long running copies.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const CHUNK_SIZE: usize = 32 * 1024;

/// Shared flag polled by the extractor between entries, links and copy chunks.
///
/// Cloning yields a handle to the same flag, so a token can be cancelled from
/// another thread while an extraction is running.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("interrupted")
    }
}

impl std::error::Error for Cancelled {}

/// Whether `err` was produced by a [`CancelableReader`] observing cancellation.
pub fn is_cancelled_error(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<Cancelled>())
}

/// Reader that fails every read once its token is cancelled.
///
/// The error is not of kind [`io::ErrorKind::Interrupted`], which `std::io` helpers
/// retry.
pub struct CancelableReader<'a, R> {
    inner: R,
    token: &'a CancelToken,
}

impl<'a, R: Read> CancelableReader<'a, R> {
    pub fn new(inner: R, token: &'a CancelToken) -> Self {
        Self { inner, token }
    }
}

impl<R: Read> Read for CancelableReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(io::Error::other(Cancelled));
        }
        self.inner.read(buf)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("interrupted")]
    Interrupted,

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// Copy `src` into `dst` until end of data, checking `token` before every read.
///
/// On interruption the bytes already written stay in `dst`.
pub fn copy_cancelable<R, W>(src: R, dst: &mut W, token: &CancelToken) -> Result<u64, CopyError>
where
    R: Read,
    W: Write + ?Sized,
{
    let mut reader = CancelableReader::new(src, token);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_cancelled_error(&e) => return Err(CopyError::Interrupted),
            Err(e) => return Err(CopyError::Read(e)),
        };
        dst.write_all(&buf[..n]).map_err(CopyError::Write)?;
        written += n as u64;
    }

    dst.flush().map_err(CopyError::Write)?;
    Ok(written)
}
