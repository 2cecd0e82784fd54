//! Stream wrapper that records every byte written to it.

use bytes::{Bytes, BytesMut};
use pin_project_lite::pin_project;
use std::io::{self, IoSlice};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Shared view of the bytes written so far.
#[derive(Debug, Clone, Default)]
pub struct SentBytes {
    inner: Arc<Mutex<BytesMut>>,
}

impl SentBytes {
    fn extend(&self, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
    }

    /// Copy of everything written up to now.
    pub fn snapshot(&self) -> Bytes {
        let sent = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Bytes::copy_from_slice(&sent)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

pin_project! {
    /// Passes reads through and tees accepted writes into [`SentBytes`].
    pub struct RecordingStream<S> {
        #[pin]
        inner: S,
        sent: SentBytes,
    }
}

impl<S> RecordingStream<S> {
    /// Record writes into `sent`, which outlives the stream.
    pub fn new(inner: S, sent: SentBytes) -> Self {
        Self { inner, sent }
    }
}

impl<S: AsyncRead> AsyncRead for RecordingStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for RecordingStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let written = std::task::ready!(this.inner.poll_write(cx, buf))?;
        this.sent.extend(&buf[..written]);
        Poll::Ready(Ok(written))
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let written = std::task::ready!(this.inner.poll_write_vectored(cx, bufs))?;
        // Only the accepted prefix reached the socket.
        let mut remaining = written;
        for buf in bufs {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(buf.len());
            this.sent.extend(&buf[..take]);
            remaining -= take;
        }
        Poll::Ready(Ok(written))
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn records_writes_and_passes_reads() {
        let (client, mut server) = tokio::io::duplex(64);
        let sent = SentBytes::default();
        let mut stream = RecordingStream::new(client, sent.clone());

        stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        stream.write_all(b"\r\n").await.unwrap();

        let mut received = vec![0u8; 18];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(&sent.snapshot()[..], b"GET / HTTP/1.1\r\n\r\n");

        server.write_all(b"pong").await.unwrap();
        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"pong");

        sent.clear();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn shared_buffer_outlives_the_stream() {
        let (client, _server) = tokio::io::duplex(64);
        let sent = SentBytes::default();
        let mut stream = RecordingStream::new(client, sent.clone());
        stream.write_all(b"partial").await.unwrap();
        drop(stream);
        assert_eq!(&sent.snapshot()[..], b"partial");
    }
}
