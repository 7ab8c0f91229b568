//! Transcript-driven conformance harness for binary protocols.
//!
//! An implementation under test (IUT) is run against a [`Transcript`]: an
//! ordered script of bytes the IUT must emit and bytes to inject as the
//! simulated peer. [`run_script`] spawns the IUT on one end of an in-memory
//! rendezvous [`duplex`](duplex::duplex) channel and replays the script with a
//! [`ScriptPlayer`] on the other, failing on the first byte that differs.
//!
//! Fixtures can be captured from live sessions with a
//! [`RecordingConnection`], which passes traffic through unchanged while
//! logging it, and converted with [`Transcript::from_events`].
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use conformance::{run_script, PlayerConfig, Transcript};
//! use futures::{AsyncReadExt, AsyncWriteExt};
//!
//! let transcript = Transcript::new().expect(*b"ping").inject(*b"pong");
//! let config = PlayerConfig::builder().name("ping").build()?;
//!
//! run_script(&config, &transcript, |mut io| async move {
//!     io.write_all(b"ping").await?;
//!     let mut buf = [0u8; 4];
//!     io.read_exact(&mut buf).await?;
//!     io.close().await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

pub mod capture;
pub mod duplex;
pub mod fixture;
pub mod harness;
pub mod player;
pub mod recorder;
pub mod transcript;

pub use capture::{capture, CaptureConfig, CaptureError, CaptureFormat};
pub use harness::{run_script, HarnessError};
pub use player::{PlayerConfig, PlayerError, ScriptPlayer, TrailingBytes};
pub use recorder::{Flow, RecordedEvent, RecordingConnection, RecordingLog};
pub use transcript::{Direction, Perspective, Segment, Transcript};
