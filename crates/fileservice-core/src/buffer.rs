//! In-memory upload buffer.
//!
//! [`UploadBuffer`] lets callers build file content in memory and hand it
//! to [`StorageBackend::save_file`](crate::StorageBackend::save_file)
//! without first materialising a temporary local file. Reading it back
//! never copies the backing storage: [`UploadBuffer::reader`] borrows the
//! valid bytes, and [`UploadBuffer::into_bytes`] moves the allocation
//! into a [`Bytes`].

use std::io::{self, Cursor, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::AsyncWrite;

/// An append-only byte sink that can be re-read without a copy.
///
/// The lifecycle is single-writer-then-single-reader. A view returned by
/// [`reader`](UploadBuffer::reader) or [`as_slice`](UploadBuffer::as_slice)
/// borrows the buffer, so it cannot outlive a subsequent write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadBuffer {
    buf: Vec<u8>,
}

impl UploadBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Append a single byte.
    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Number of valid bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The valid bytes, borrowed.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// A readable view over exactly the bytes written so far.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.buf)
    }

    /// Hand the buffer over as [`Bytes`] without copying it.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

impl From<Vec<u8>> for UploadBuffer {
    fn from(buf: Vec<u8>) -> Self {
        Self { buf }
    }
}

impl Write for UploadBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncWrite for UploadBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_write_byte_tracks_len() {
        let mut buffer = UploadBuffer::new();
        assert!(buffer.is_empty());
        for b in b"this is the test file 2" {
            buffer.write_byte(*b);
        }
        assert_eq!(buffer.len(), 23);
        assert_eq!(buffer.as_slice(), b"this is the test file 2");
    }

    #[test]
    fn test_reader_is_bounded_by_valid_bytes() {
        let mut buffer = UploadBuffer::with_capacity(1024);
        Write::write_all(&mut buffer, b"abc").unwrap();
        let mut out = Vec::new();
        buffer.reader().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_reader_shares_backing_storage() {
        let mut buffer = UploadBuffer::new();
        Write::write_all(&mut buffer, b"shared").unwrap();
        let view = buffer.reader();
        assert_eq!(view.get_ref().as_ptr(), buffer.as_slice().as_ptr());
    }

    #[test]
    fn test_into_bytes_does_not_copy() {
        let buffer = UploadBuffer::from(b"payload".to_vec());
        let ptr = buffer.as_slice().as_ptr();
        let bytes = buffer.into_bytes();
        assert_eq!(&bytes[..], b"payload");
        assert_eq!(bytes.as_ptr(), ptr);
    }

    #[tokio::test]
    async fn test_async_write() {
        let mut buffer = UploadBuffer::new();
        // Both `Write` and `AsyncWriteExt` are in scope here.
        AsyncWriteExt::write_all(&mut buffer, b"async ").await.unwrap();
        AsyncWriteExt::write_all(&mut buffer, b"content").await.unwrap();
        AsyncWriteExt::flush(&mut buffer).await.unwrap();
        assert_eq!(buffer.as_slice(), b"async content");
    }
}
