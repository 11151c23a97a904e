//! Replay capture for bytes consumed during handshake parsing.
//!
//! The handshake is parsed straight off the live client socket, but the
//! backend still needs those bytes verbatim. [`ReplayReader`] tees every
//! byte it hands to the parser into an owned buffer, which the session
//! forwards to the backend before splicing starts.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// An [`AsyncRead`] decorator that records everything read through it.
///
/// The captured bytes survive a failed parse too; whether they are used
/// downstream is the caller's decision.
#[derive(Debug)]
pub struct ReplayReader<R> {
    inner: R,
    buffered: Vec<u8>,
}

impl<R> ReplayReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffered: Vec::new(),
        }
    }

    /// Consume the reader, returning the inner stream and every byte read
    /// through it, in order.
    pub fn into_parts(self) -> (R, Vec<u8>) {
        (self.inner, self.buffered)
    }
}

impl<R> AsyncRead for ReplayReader<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        let filled_before = buf.filled().len();
        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                me.buffered.extend_from_slice(&buf.filled()[filled_before..]);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn captures_reads_in_order() {
        let mut reader = ReplayReader::new(Cursor::new(&b"hello world"[..]));

        let mut first = [0u8; 5];
        reader.read_exact(&mut first).await.unwrap();
        let mut second = [0u8; 1];
        reader.read_exact(&mut second).await.unwrap();

        let (_, buffered) = reader.into_parts();
        assert_eq!(buffered, b"hello ");
    }

    #[tokio::test]
    async fn unread_bytes_stay_in_inner_stream() {
        let mut reader = ReplayReader::new(Cursor::new(&b"abcdef"[..]));

        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).await.unwrap();

        let (mut inner, buffered) = reader.into_parts();
        assert_eq!(buffered, b"abc");

        let mut rest = Vec::new();
        inner.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"def");
    }

    #[tokio::test]
    async fn empty_when_nothing_read() {
        let reader = ReplayReader::new(Cursor::new(&b"abc"[..]));
        let (_, buffered) = reader.into_parts();
        assert!(buffered.is_empty());
    }
}
