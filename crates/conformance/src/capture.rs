//! Live capture.
//!
//! Runs one session of the IUT against a real peer over a
//! [`RecordingConnection`] and writes the captured exchange to a sink, ready
//! to be turned into a new fixture. Capture needs a live peer, so it is off
//! unless explicitly enabled in the [`CaptureConfig`] passed in.

use std::{error::Error, future::Future, io::Write};

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::{
    fixture::write_fixture,
    recorder::RecordingConnection,
    transcript::{Perspective, Transcript},
};

/// Default address of the peer to capture against.
pub const DEFAULT_CAPTURE_ADDR: &str = "127.0.0.1:10443";

/// Connection handed to the IUT during capture.
pub type CaptureConnection = RecordingConnection<Compat<TcpStream>>;

/// Output format of a capture.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFormat {
    /// The hex fixture format, see [`crate::fixture`].
    #[default]
    Fixture,
    /// The transcript as JSON.
    Json,
}

/// Configuration for [`capture`].
#[derive(derive_builder::Builder, Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Whether live capture is enabled.
    #[builder(default)]
    #[serde(default)]
    enabled: bool,
    /// Address of the peer.
    #[builder(setter(into), default = "DEFAULT_CAPTURE_ADDR.to_string()")]
    #[serde(default = "default_addr")]
    addr: String,
    /// Output format.
    #[builder(default)]
    #[serde(default)]
    format: CaptureFormat,
}

fn default_addr() -> String {
    DEFAULT_CAPTURE_ADDR.to_string()
}

impl CaptureConfig {
    /// Creates a new builder for `CaptureConfig`.
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder::default()
    }

    /// Returns whether live capture is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the peer address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Returns the output format.
    pub fn format(&self) -> CaptureFormat {
        self.format
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_addr(),
            format: CaptureFormat::default(),
        }
    }
}

/// Writes `transcript` to `sink` in the given format.
///
/// # Errors
///
/// Returns an error if serializing or writing fails.
pub fn write_transcript<W: Write>(
    transcript: &Transcript,
    format: CaptureFormat,
    mut sink: W,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match format {
        CaptureFormat::Fixture => write_fixture(transcript, &mut sink)?,
        CaptureFormat::Json => {
            serde_json::to_writer_pretty(&mut sink, transcript)?;
            writeln!(sink)?;
        }
    }

    Ok(())
}

/// Error for [`capture`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CaptureError {
    /// Connecting to the peer failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address of the peer.
        addr: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The IUT session failed.
    #[error("capture session failed: {0}")]
    Iut(#[source] Box<dyn Error + Send + Sync>),
    /// Writing the capture failed.
    #[error("failed to write capture: {0}")]
    Output(#[source] Box<dyn Error + Send + Sync>),
}

/// Captures one IUT session against a live peer.
///
/// Returns `Ok(None)` without touching the network when capture is disabled.
/// Otherwise the recorded exchange is written to `sink` in the configured
/// format and returned as a transcript from the IUT's perspective.
///
/// # Errors
///
/// Returns an error if connecting, the session or writing the output fails.
#[tracing::instrument(skip_all, fields(addr = %config.addr()), err)]
pub async fn capture<F, Fut, E, W>(
    config: &CaptureConfig,
    iut: F,
    mut sink: W,
) -> Result<Option<Transcript>, CaptureError>
where
    F: FnOnce(CaptureConnection) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Into<Box<dyn Error + Send + Sync>>,
    W: Write,
{
    if !config.enabled() {
        tracing::debug!("live capture disabled");
        return Ok(None);
    }

    let socket = TcpStream::connect(config.addr())
        .await
        .map_err(|source| CaptureError::Connect {
            addr: config.addr().to_string(),
            source,
        })?;

    tracing::info!("connected, running capture session");

    let conn = RecordingConnection::new(socket.compat());
    let log = conn.log();

    iut(conn).await.map_err(|err| CaptureError::Iut(err.into()))?;

    let events = log.drain();
    let transcript = Transcript::from_events(&events, Perspective::Iut);

    write_transcript(&transcript, config.format(), &mut sink)
        .map_err(CaptureError::Output)?;

    tracing::info!(
        events = events.len(),
        segments = transcript.len(),
        "capture finished"
    );

    Ok(Some(transcript))
}
