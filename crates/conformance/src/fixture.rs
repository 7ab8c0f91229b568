//! Hex fixture format.
//!
//! A plain text rendition of a [`Transcript`], meant to be pasted into test
//! fixture files and edited by hand:
//!
//! ```text
//! # captured from a gnutls server
//! >>> 1 from iut (5 bytes)
//! 1603010005
//! <<< 2 to iut (3 bytes)
//! 160301
//! ```
//!
//! `>>>` opens an expectation and `<<<` an injection; the rest of a header
//! line is informational. The lines up to the next header are hex, with any
//! whitespace ignored. Blank lines and lines starting with `#` are skipped.

use std::io::{self, Write};

use crate::transcript::{Direction, Segment, Transcript};

const FROM_IUT_MARKER: &str = ">>>";
const TO_IUT_MARKER: &str = "<<<";
const BYTES_PER_LINE: usize = 16;

/// Writes `transcript` in the fixture format.
pub fn write_fixture<W: Write>(transcript: &Transcript, mut w: W) -> io::Result<()> {
    w.write_all(to_fixture_string(transcript).as_bytes())?;
    w.flush()
}

/// Returns `transcript` in the fixture format.
pub fn to_fixture_string(transcript: &Transcript) -> String {
    let mut out = String::new();
    for (index, segment) in transcript.iter().enumerate() {
        let marker = match segment.direction() {
            Direction::FromIut => FROM_IUT_MARKER,
            Direction::ToIut => TO_IUT_MARKER,
        };
        out.push_str(&format!(
            "{marker} {} {} ({} bytes)\n",
            index + 1,
            segment.direction(),
            segment.len()
        ));

        for chunk in segment.payload().chunks(BYTES_PER_LINE) {
            out.push_str(&hex::encode(chunk));
            out.push('\n');
        }
    }

    out
}

/// Parses a transcript from the fixture format.
///
/// # Errors
///
/// Returns an error for payload lines before the first header and for
/// invalid hex.
pub fn parse_fixture(input: &str) -> Result<Transcript, FixtureError> {
    let mut transcript = Transcript::new();
    let mut current: Option<(Direction, Vec<u8>)> = None;

    for (i, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let direction = if line.starts_with(FROM_IUT_MARKER) {
            Some(Direction::FromIut)
        } else if line.starts_with(TO_IUT_MARKER) {
            Some(Direction::ToIut)
        } else {
            None
        };

        if let Some(direction) = direction {
            if let Some((previous, payload)) = current.take() {
                transcript.push(Segment::new(previous, payload));
            }
            current = Some((direction, Vec::new()));
            continue;
        }

        let Some((_, payload)) = current.as_mut() else {
            return Err(FixtureError::new(i + 1, FixtureErrorKind::MissingHeader));
        };

        let hex: String = line.split_whitespace().collect();
        let bytes = hex::decode(hex)
            .map_err(|err| FixtureError::new(i + 1, FixtureErrorKind::InvalidHex(err)))?;
        payload.extend_from_slice(&bytes);
    }

    if let Some((direction, payload)) = current {
        transcript.push(Segment::new(direction, payload));
    }

    Ok(transcript)
}

/// Error for [`parse_fixture`].
#[derive(Debug, thiserror::Error)]
#[error("fixture line {line}: {kind}")]
pub struct FixtureError {
    line: usize,
    #[source]
    kind: FixtureErrorKind,
}

impl FixtureError {
    fn new(line: usize, kind: FixtureErrorKind) -> Self {
        Self { line, kind }
    }

    /// Returns the 1-based line number of the error.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &FixtureErrorKind {
        &self.kind
    }
}

/// Kind of [`FixtureError`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FixtureErrorKind {
    /// Payload data appeared before any segment header.
    #[error("payload before the first segment header")]
    MissingHeader,
    /// A payload line is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(#[source] hex::FromHexError),
}
