//! Recording connection.
//!
//! [`RecordingConnection`] wraps any bidirectional byte stream and passes all
//! reads and writes through unchanged, while appending every completed
//! transfer to a shared [`RecordingLog`]. The log records this endpoint's view
//! of the exchange, in the order the wrapper's own calls completed, not a
//! global wire trace.
//!
//! An event is logged when the inner read or write completes, not when the
//! call is first made. A write that is still pending, or that is dropped
//! before completing, does not appear in the log.

use std::{
    fmt,
    io::Result,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use futures::{AsyncRead, AsyncWrite};
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use web_time::Instant;

/// Direction of a recorded transfer, from the recording endpoint's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Written by the recording endpoint.
    Sent,
    /// Read by the recording endpoint.
    Received,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Sent => write!(f, "sent"),
            Flow::Received => write!(f, "received"),
        }
    }
}

/// A single transfer captured by a [`RecordingConnection`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    seq: u64,
    flow: Flow,
    #[serde(with = "hex::serde")]
    payload: Vec<u8>,
    elapsed: Duration,
}

impl RecordedEvent {
    /// Creates a new event.
    pub fn new(seq: u64, flow: Flow, payload: Vec<u8>, elapsed: Duration) -> Self {
        Self {
            seq,
            flow,
            payload,
            elapsed,
        }
    }

    /// Returns the sequence number of the event within its log.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the flow of the event.
    pub fn flow(&self) -> Flow {
        self.flow
    }

    /// Returns the transferred bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the time elapsed between the creation of the log and the event.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl fmt::Debug for RecordedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordedEvent")
            .field("seq", &self.seq)
            .field("flow", &self.flow)
            .field("payload", &hex::encode(&self.payload))
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

#[derive(Debug)]
struct LogState {
    start: Instant,
    next_seq: u64,
    events: Vec<RecordedEvent>,
}

/// Shared, append-only log of a [`RecordingConnection`].
///
/// The handle can be cloned and kept while the connection itself is moved
/// into the code driving the session.
#[derive(Debug, Clone)]
pub struct RecordingLog(Arc<Mutex<LogState>>);

impl RecordingLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(LogState {
            start: Instant::now(),
            next_seq: 0,
            events: Vec::new(),
        })))
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, flow: Flow, payload: &[u8]) {
        let mut state = self.lock();
        let event = RecordedEvent {
            seq: state.next_seq,
            flow,
            payload: payload.to_vec(),
            elapsed: state.start.elapsed(),
        };
        tracing::trace!(seq = event.seq, %flow, len = payload.len(), "recorded transfer");
        state.next_seq += 1;
        state.events.push(event);
    }

    /// Takes all events recorded so far, in order.
    ///
    /// Sequence numbers keep increasing across drains.
    pub fn drain(&self) -> Vec<RecordedEvent> {
        std::mem::take(&mut self.lock().events)
    }

    /// Returns the number of events not yet drained.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Returns `true` if there are no events to drain.
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }
}

impl Default for RecordingLog {
    fn default() -> Self {
        Self::new()
    }
}

pin_project! {
    /// A connection wrapper which records all transferred bytes.
    #[derive(Debug)]
    pub struct RecordingConnection<Io> {
        log: RecordingLog,
        #[pin] io: Io,
    }
}

impl<Io> RecordingConnection<Io> {
    /// Wraps the provided connection.
    pub fn new(io: Io) -> Self {
        Self {
            log: RecordingLog::new(),
            io,
        }
    }

    /// Returns a handle to the log of this connection.
    pub fn log(&self) -> RecordingLog {
        self.log.clone()
    }

    /// Takes all events recorded so far, in order.
    pub fn drain(&self) -> Vec<RecordedEvent> {
        self.log.drain()
    }

    /// Returns a reference to the wrapped connection.
    pub fn get_ref(&self) -> &Io {
        &self.io
    }

    /// Returns a mutable reference to the wrapped connection.
    pub fn get_mut(&mut self) -> &mut Io {
        &mut self.io
    }

    /// Returns the wrapped connection and the log.
    pub fn into_inner(self) -> (Io, RecordingLog) {
        (self.io, self.log)
    }
}

impl<Io> AsyncWrite for RecordingConnection<Io>
where
    Io: AsyncWrite,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>> {
        let this = self.project();
        this.io.poll_write(cx, buf).map(|res| {
            res.inspect(|n| {
                if *n > 0 {
                    this.log.record(Flow::Sent, &buf[..*n]);
                }
            })
        })
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.project().io.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.project().io.poll_close(cx)
    }
}

impl<Io> AsyncRead for RecordingConnection<Io>
where
    Io: AsyncRead,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize>> {
        let this = self.project();
        this.io.poll_read(cx, buf).map(|res| {
            res.inspect(|n| {
                if *n > 0 {
                    this.log.record(Flow::Received, &buf[..*n]);
                }
            })
        })
    }
}
