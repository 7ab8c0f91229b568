//! Script player.
//!
//! The [`ScriptPlayer`] drives one end of a connection through a
//! [`Transcript`]: for each expectation it reads exactly the expected number
//! of bytes and compares them, for each injection it writes the payload and
//! waits for the write to complete. The first failure aborts the run.

use std::time::Duration;

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use serde::{Deserialize, Serialize};

use crate::transcript::{first_mismatch, Direction, Segment, Transcript};

/// Treatment of bytes the IUT sends after the last segment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingBytes {
    /// Stop once all segments are satisfied without reading further.
    #[default]
    Ignore,
    /// Read until the IUT closes and fail if it sent anything.
    Reject,
}

/// Configuration for a [`ScriptPlayer`].
#[derive(derive_builder::Builder, Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Name of the script, used in diagnostics.
    #[builder(setter(into), default = "String::from(\"script\")")]
    name: String,
    /// Treatment of unread bytes after the last segment.
    #[builder(default)]
    trailing: TrailingBytes,
    /// Upper bound for a whole run, enforced by the harness.
    #[builder(setter(strip_option), default)]
    timeout: Option<Duration>,
}

impl PlayerConfig {
    /// Creates a new builder for `PlayerConfig`.
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Returns the name of the script.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the trailing bytes policy.
    pub fn trailing(&self) -> TrailingBytes {
        self.trailing
    }

    /// Returns the run timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: String::from("script"),
            trailing: TrailingBytes::default(),
            timeout: None,
        }
    }
}

/// Replays a [`Transcript`] against a connection to the IUT.
#[derive(Debug, Clone, Default)]
pub struct ScriptPlayer {
    config: PlayerConfig,
}

impl ScriptPlayer {
    /// Creates a new player.
    pub fn new(config: PlayerConfig) -> Self {
        Self { config }
    }

    /// Returns the player configuration.
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Replays the transcript against `io`.
    ///
    /// # Errors
    ///
    /// Returns an error on the first mismatch, short read or IO failure.
    #[tracing::instrument(
        skip_all,
        fields(name = %self.config.name, segments = transcript.len()),
        err
    )]
    pub async fn run<Io>(&self, transcript: &Transcript, io: &mut Io) -> Result<(), PlayerError>
    where
        Io: AsyncRead + AsyncWrite + Unpin,
    {
        for (index, segment) in transcript.iter().enumerate() {
            tracing::debug!(
                index,
                direction = %segment.direction(),
                len = segment.len(),
                "playing segment"
            );

            self.play(segment, io)
                .await
                .map_err(|kind| self.error(index, kind))?;
        }

        if self.config.trailing == TrailingBytes::Reject {
            let mut trailing = Vec::new();
            io.read_to_end(&mut trailing)
                .await
                .map_err(|err| self.error(transcript.len(), ErrorKind::Io(err)))?;

            if !trailing.is_empty() {
                return Err(self.error(
                    transcript.len(),
                    ErrorKind::TrailingBytes { bytes: trailing },
                ));
            }
        }

        tracing::debug!("script completed");

        Ok(())
    }

    async fn play<Io>(&self, segment: &Segment, io: &mut Io) -> Result<(), ErrorKind>
    where
        Io: AsyncRead + AsyncWrite + Unpin,
    {
        match segment.direction() {
            Direction::FromIut => {
                let expected = segment.payload();
                let actual = read_up_to(io, expected.len()).await?;

                if actual.len() < expected.len() {
                    return Err(ErrorKind::ShortRead {
                        expected: expected.len(),
                        actual: actual.len(),
                    });
                }

                if let Some(offset) = first_mismatch(expected, &actual) {
                    return Err(ErrorKind::Mismatch {
                        offset,
                        expected: expected.to_vec(),
                        actual,
                    });
                }
            }
            Direction::ToIut => {
                io.write_all(segment.payload()).await?;
                io.flush().await?;
            }
        }

        Ok(())
    }

    fn error(&self, index: usize, kind: ErrorKind) -> PlayerError {
        PlayerError {
            name: self.config.name.clone(),
            index,
            kind,
        }
    }
}

/// Reads until `len` bytes arrived or the stream ended.
async fn read_up_to<Io>(io: &mut Io, len: usize) -> std::io::Result<Vec<u8>>
where
    Io: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match io.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    buf.truncate(filled);

    Ok(buf)
}

/// Error for [`ScriptPlayer`].
#[derive(Debug, thiserror::Error)]
#[error("{name} #{index}: {kind}")]
pub struct PlayerError {
    name: String,
    index: usize,
    #[source]
    kind: ErrorKind,
}

impl PlayerError {
    /// Returns the name of the script.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the index of the failing segment.
    ///
    /// Trailing bytes are reported at the index one past the last segment.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the kind of failure.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

/// Kind of [`PlayerError`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The IUT emitted different bytes than expected.
    #[error(
        "mismatch on read at offset {offset}: got:{} want:{}",
        hex::encode(.actual),
        hex::encode(.expected)
    )]
    Mismatch {
        /// Offset of the first differing byte.
        offset: usize,
        /// Expected bytes.
        expected: Vec<u8>,
        /// Bytes read from the IUT.
        actual: Vec<u8>,
    },
    /// The stream ended before the expected bytes arrived.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Number of expected bytes.
        expected: usize,
        /// Number of bytes read before the stream ended.
        actual: usize,
    },
    /// The underlying connection failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The IUT sent bytes after the last segment.
    #[error("{} unexpected trailing bytes: {}", .bytes.len(), hex::encode(.bytes))]
    TrailingBytes {
        /// The unread bytes.
        bytes: Vec<u8>,
    },
}
