//! In-memory rendezvous duplex channel.
//!
//! [`duplex`] returns two connected [`DuplexStream`]s. The channel is
//! unbuffered: a write hands its bytes to the other end and only completes
//! once the reader there has consumed all of them. A reader may consume an
//! offered write over several reads.
//!
//! An offer belongs to the write that made it. If that write is dropped
//! before completing, the next write with different bytes withdraws whatever
//! the reader has not seen yet and offers its own bytes instead.

use std::{
    io::{Error, ErrorKind, Result},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

use futures::{AsyncRead, AsyncWrite};

/// One direction of the channel.
#[derive(Debug, Default)]
struct Pipe {
    /// Bytes offered by the in-flight write.
    data: Vec<u8>,
    /// Read position into `data`.
    pos: usize,
    /// Whether `data` holds an offer.
    offered: bool,
    write_closed: bool,
    read_closed: bool,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

impl Pipe {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn wake_writer(&mut self) {
        if let Some(waker) = self.write_waker.take() {
            waker.wake();
        }
    }

    fn close_write(&mut self) {
        self.write_closed = true;
        self.wake_reader();
    }

    fn close_read(&mut self) {
        self.read_closed = true;
        self.wake_writer();
    }

    fn clear_offer(&mut self) {
        self.data.clear();
        self.pos = 0;
        self.offered = false;
    }
}

fn lock(pipe: &Mutex<Pipe>) -> MutexGuard<'_, Pipe> {
    pipe.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates a connected pair of rendezvous streams.
pub fn duplex() -> (DuplexStream, DuplexStream) {
    let a_to_b = Arc::new(Mutex::new(Pipe::default()));
    let b_to_a = Arc::new(Mutex::new(Pipe::default()));

    (
        DuplexStream {
            inbound: b_to_a.clone(),
            outbound: a_to_b.clone(),
        },
        DuplexStream {
            inbound: a_to_b,
            outbound: b_to_a,
        },
    )
}

/// One end of a rendezvous duplex channel.
///
/// Dropping an end closes both of its directions: the other end reads EOF and
/// its writes fail with [`ErrorKind::BrokenPipe`].
#[derive(Debug)]
pub struct DuplexStream {
    inbound: Arc<Mutex<Pipe>>,
    outbound: Arc<Mutex<Pipe>>,
}

impl AsyncRead for DuplexStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let mut pipe = lock(&self.inbound);
        if pipe.pos < pipe.data.len() {
            let n = buf.len().min(pipe.data.len() - pipe.pos);
            buf[..n].copy_from_slice(&pipe.data[pipe.pos..pipe.pos + n]);
            pipe.pos += n;

            if pipe.pos == pipe.data.len() {
                pipe.wake_writer();
            }

            return Poll::Ready(Ok(n));
        }

        if pipe.write_closed {
            return Poll::Ready(Ok(0));
        }

        pipe.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for DuplexStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>> {
        let mut pipe = lock(&self.outbound);

        if pipe.offered {
            if buf == pipe.data.as_slice() {
                // Consumed bytes count as written even if the reader is gone.
                if pipe.pos == pipe.data.len() {
                    let n = pipe.data.len();
                    pipe.clear_offer();
                    return Poll::Ready(Ok(n));
                }
            } else {
                // The write that made this offer was dropped.
                pipe.clear_offer();
            }
        }

        if pipe.read_closed {
            return Poll::Ready(Err(Error::new(
                ErrorKind::BrokenPipe,
                "duplex peer closed its end",
            )));
        }

        if pipe.write_closed {
            return Poll::Ready(Err(Error::new(
                ErrorKind::BrokenPipe,
                "write after close",
            )));
        }

        if !pipe.offered {
            if buf.is_empty() {
                return Poll::Ready(Ok(0));
            }

            pipe.data.extend_from_slice(buf);
            pipe.offered = true;
            pipe.wake_reader();
        }

        pipe.write_waker = Some(cx.waker().clone());
        Poll::Pending
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        lock(&self.outbound).close_write();
        Poll::Ready(Ok(()))
    }
}

impl Drop for DuplexStream {
    fn drop(&mut self) {
        lock(&self.outbound).close_write();
        lock(&self.inbound).close_read();
    }
}
