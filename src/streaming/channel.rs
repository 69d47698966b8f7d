//! Conduit: bounded byte pipe between the transform task and the network task.
//!
//! One producer, one consumer, backpressure from `tokio::io::duplex`.
//! The producer's outcome travels on a oneshot next to the bytes so the
//! consumer can tell a finished stream from a failed one.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::oneshot;

/// Bytes buffered between producer and consumer before the producer blocks
pub const CONDUIT_CAPACITY: usize = 64 * 1024;

/// What the producer reports when it closes the write end
pub type Outcome = std::result::Result<(), String>;

/// Create a connected (write end, read end) pair.
pub fn conduit(capacity: usize) -> (ConduitWriter, ConduitReader) {
    let (write_half, read_half) = tokio::io::duplex(capacity);
    let (status_tx, status_rx) = oneshot::channel();
    (
        ConduitWriter {
            stream: write_half,
            status: status_tx,
        },
        ConduitReader {
            stream: read_half,
            status: Some(status_rx),
            failure: None,
        },
    )
}

/// Write end. Consumed by [`ConduitWriter::close`].
#[derive(Debug)]
pub struct ConduitWriter {
    stream: DuplexStream,
    status: oneshot::Sender<Outcome>,
}

impl ConduitWriter {
    /// Publish the producer's outcome, then close the write end.
    ///
    /// The reader drains everything already buffered before it sees either a
    /// clean end-of-stream or the error.
    pub fn close(self, outcome: Outcome) {
        let ConduitWriter { stream, status } = self;
        let _ = status.send(outcome);
        drop(stream);
    }
}

impl AsyncWrite for ConduitWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Read end.
#[derive(Debug)]
pub struct ConduitReader {
    stream: DuplexStream,
    status: Option<oneshot::Receiver<Outcome>>,
    failure: Option<(io::ErrorKind, String)>,
}

impl AsyncRead for ConduitReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if let Some((kind, msg)) = &this.failure {
            return Poll::Ready(Err(io::Error::new(*kind, msg.clone())));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.stream).poll_read(cx, buf))?;
        if buf.filled().len() > before {
            return Poll::Ready(Ok(()));
        }

        // End of stream: only clean if the producer said so.
        let Some(status) = this.status.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let outcome = ready!(Pin::new(status).poll(cx));
        this.status = None;

        let failure = match outcome {
            Ok(Ok(())) => return Poll::Ready(Ok(())),
            Ok(Err(msg)) => (io::ErrorKind::Other, msg),
            Err(_) => (
                io::ErrorKind::BrokenPipe,
                "conduit closed prematurely".to_string(),
            ),
        };
        let err = io::Error::new(failure.0, failure.1.clone());
        this.failure = Some(failure);
        Poll::Ready(Err(err))
    }
}
