//! Digesting, cancellable wrappers around caller-owned streams.

use super::format::DIGEST_SIZE;
use crate::error::{CoreError, CoreResult, StreamCancelled};
use crate::task::CancelToken;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

fn check(cancel: Option<&CancelToken>) -> io::Result<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(StreamCancelled::into_io()),
        _ => Ok(()),
    }
}

/// Hashes and counts every byte written through it.
pub(crate) struct StreamWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
    cancel: Option<CancelToken>,
}

impl<W: Write> StreamWriter<W> {
    pub(crate) fn new(inner: W, cancel: Option<CancelToken>) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
            cancel,
        }
    }

    /// Writes the digest footer and flushes. Returns the total byte count.
    pub(crate) fn finish(mut self) -> CoreResult<u64> {
        let digest = self.hasher.finalize_reset();
        check(self.cancel.as_ref()).map_err(CoreError::from_io)?;
        self.inner.write_all(&digest).map_err(CoreError::from_io)?;
        self.inner.flush().map_err(CoreError::from_io)?;
        Ok(self.written + DIGEST_SIZE as u64)
    }
}

impl<W: Write> Write for StreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        check(self.cancel.as_ref())?;
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        check(self.cancel.as_ref())?;
        self.inner.flush()
    }
}

/// Hashes and counts every byte read through it.
pub(crate) struct StreamReader<R> {
    inner: R,
    hasher: Sha256,
    read: u64,
    cancel: Option<CancelToken>,
}

impl<R: Read> StreamReader<R> {
    pub(crate) fn new(inner: R, cancel: Option<CancelToken>) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            read: 0,
            cancel,
        }
    }

    /// Reads the digest footer and compares it with the bytes read so far.
    ///
    /// Returns whether the digest matched and the total byte count.
    pub(crate) fn finish(mut self) -> CoreResult<(bool, u64)> {
        let expected = self.hasher.finalize_reset();
        let mut footer = [0u8; DIGEST_SIZE];
        check(self.cancel.as_ref()).map_err(CoreError::from_io)?;
        self.inner
            .read_exact(&mut footer)
            .map_err(CoreError::from_io)?;
        Ok((
            expected.as_slice() == footer.as_slice(),
            self.read + DIGEST_SIZE as u64,
        ))
    }
}

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        check(self.cancel.as_ref())?;
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_matches_content() {
        let mut out = Vec::new();
        let mut writer = StreamWriter::new(&mut out, None);
        writer.write_all(b"payload").unwrap();
        assert_eq!(writer.finish().unwrap(), 7 + 32);

        let mut reader = StreamReader::new(out.as_slice(), None);
        let mut body = [0u8; 7];
        reader.read_exact(&mut body).unwrap();
        assert_eq!(&body, b"payload");
        assert_eq!(reader.finish().unwrap(), (true, 39));
    }

    #[test]
    fn tampered_content_fails_digest() {
        let mut out = Vec::new();
        let mut writer = StreamWriter::new(&mut out, None);
        writer.write_all(b"payload").unwrap();
        writer.finish().unwrap();
        out[0] ^= 0xff;

        let mut reader = StreamReader::new(out.as_slice(), None);
        let mut body = [0u8; 7];
        reader.read_exact(&mut body).unwrap();
        assert!(!reader.finish().unwrap().0);
    }

    #[test]
    fn cancelled_token_stops_io() {
        let token = CancelToken::new();
        let mut writer = StreamWriter::new(Vec::new(), Some(token.clone()));
        writer.write_all(b"a").unwrap();
        token.cancel();
        let err = writer.write_all(b"b").unwrap_err();
        assert!(matches!(CoreError::from_io(err), CoreError::Cancelled));

        let mut reader = StreamReader::new(&b"abc"[..], Some(token));
        let mut buf = [0u8; 1];
        assert!(matches!(
            CoreError::from_io(reader.read_exact(&mut buf).unwrap_err()),
            CoreError::Cancelled
        ));
    }
}
