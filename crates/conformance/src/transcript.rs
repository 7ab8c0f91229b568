//! Transcript types.
//!
//! A [`Transcript`] is the script of one conformance test: an ordered list of
//! [`Segment`]s, each either an expectation of bytes the implementation under
//! test (IUT) must emit, or bytes to inject as if they came from the peer.
//!
//! The order of segments encodes the turn-taking of the exchange. Within a
//! run of consecutive segments of the same [`Direction`] the boundaries carry
//! no meaning on the wire: the player simply reads or writes them in order.
//!
//! Transcripts can be authored by hand, converted from legacy positional
//! scripts with [`Transcript::from_positional`], or derived from a recorded
//! session with [`Transcript::from_events`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::recorder::{Flow, RecordedEvent};

/// Direction of a transcript segment, relative to the IUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Bytes the IUT is expected to emit.
    FromIut,
    /// Bytes injected into the IUT as peer input.
    ToIut,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn flip(self) -> Self {
        match self {
            Direction::FromIut => Direction::ToIut,
            Direction::ToIut => Direction::FromIut,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::FromIut => write!(f, "from iut"),
            Direction::ToIut => write!(f, "to iut"),
        }
    }
}

/// The side of a session a recording was taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    /// The recorder wrapped the IUT's own connection.
    Iut,
    /// The recorder wrapped the peer's end of the connection.
    Peer,
}

impl Perspective {
    /// Maps a recorded flow onto a segment direction.
    pub fn direction(self, flow: Flow) -> Direction {
        match (self, flow) {
            (Perspective::Iut, Flow::Sent) | (Perspective::Peer, Flow::Received) => {
                Direction::FromIut
            }
            (Perspective::Iut, Flow::Received) | (Perspective::Peer, Flow::Sent) => {
                Direction::ToIut
            }
        }
    }
}

/// One expectation or injection unit of a transcript.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    direction: Direction,
    #[serde(with = "hex::serde")]
    payload: Vec<u8>,
}

impl Segment {
    /// Creates a new segment.
    pub fn new(direction: Direction, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            direction,
            payload: payload.into(),
        }
    }

    /// Creates a segment the IUT is expected to emit.
    pub fn expect(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Direction::FromIut, payload)
    }

    /// Creates a segment to inject into the IUT.
    pub fn inject(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Direction::ToIut, payload)
    }

    /// Returns the direction of the segment.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the payload of the segment.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the length of the payload.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.payload.len()
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("direction", &self.direction)
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

/// An ordered script of expected and injected byte segments.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    segments: Vec<Segment>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an expectation of bytes emitted by the IUT.
    pub fn expect(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.segments.push(Segment::expect(payload));
        self
    }

    /// Appends bytes to inject into the IUT.
    pub fn inject(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.segments.push(Segment::inject(payload));
        self
    }

    /// Appends a segment.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns an iterator over the segments.
    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    /// Returns the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if the transcript has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the total number of payload bytes in the given direction.
    pub fn total_len(&self, direction: Direction) -> usize {
        self.segments
            .iter()
            .filter(|segment| segment.direction == direction)
            .map(Segment::len)
            .sum()
    }

    /// Creates a transcript from a positional script.
    ///
    /// Even positions are expectations of IUT output, odd positions are
    /// injections.
    pub fn from_positional<I, P>(script: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let segments = script
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let direction = if i % 2 == 0 {
                    Direction::FromIut
                } else {
                    Direction::ToIut
                };
                Segment::new(direction, payload)
            })
            .collect();

        Self { segments }
    }

    /// Converts the transcript into a positional script.
    ///
    /// # Errors
    ///
    /// Returns an error if the segments do not strictly alternate starting
    /// with an expectation.
    pub fn to_positional(&self) -> Result<Vec<Vec<u8>>, TranscriptError> {
        let mut expected = Direction::FromIut;
        let mut script = Vec::with_capacity(self.segments.len());
        for (index, segment) in self.segments.iter().enumerate() {
            if segment.direction != expected {
                return Err(TranscriptError::NotAlternating {
                    index,
                    direction: segment.direction,
                });
            }
            script.push(segment.payload.clone());
            expected = expected.flip();
        }

        Ok(script)
    }

    /// Creates a transcript from a recorded session.
    ///
    /// Consecutive events of the same flow are concatenated into a single
    /// segment and empty events are dropped.
    pub fn from_events<'a, I>(events: I, perspective: Perspective) -> Self
    where
        I: IntoIterator<Item = &'a RecordedEvent>,
    {
        let mut segments: Vec<Segment> = Vec::new();
        for event in events {
            if event.payload().is_empty() {
                continue;
            }

            let direction = perspective.direction(event.flow());
            match segments.last_mut() {
                Some(last) if last.direction == direction => {
                    last.payload.extend_from_slice(event.payload())
                }
                _ => segments.push(Segment::new(direction, event.payload())),
            }
        }

        Self { segments }
    }
}

impl FromIterator<Segment> for Transcript {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

/// Returns the offset of the first byte at which `actual` differs from
/// `expected`, or `None` if they are equal.
///
/// If one is a prefix of the other the mismatch is at the shorter length.
pub fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(actual)
        .position(|(a, b)| a != b)
        .or_else(|| (expected.len() != actual.len()).then_some(expected.len().min(actual.len())))
}

/// Error for [`Transcript`] conversions.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TranscriptError {
    /// The transcript does not fit the positional encoding.
    #[error("segment #{index} is {direction}, positional scripts must alternate starting with from iut")]
    NotAlternating {
        /// Index of the offending segment.
        index: usize,
        /// Direction of the offending segment.
        direction: Direction,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::recorder::RecordedEvent;
    use std::time::Duration;

    fn event(seq: u64, flow: Flow, payload: &[u8]) -> RecordedEvent {
        RecordedEvent::new(seq, flow, payload.to_vec(), Duration::ZERO)
    }

    #[test]
    fn test_positional_conversion() {
        let script: Vec<Vec<u8>> = vec![vec![1, 2], vec![3], vec![4, 5, 6]];
        let transcript = Transcript::from_positional(script.clone());

        let directions: Vec<_> = transcript.iter().map(Segment::direction).collect();
        assert_eq!(
            directions,
            vec![Direction::FromIut, Direction::ToIut, Direction::FromIut]
        );
        assert_eq!(transcript.to_positional().unwrap(), script);
    }

    #[test]
    fn test_to_positional_rejects_non_alternating() {
        let transcript = Transcript::new().expect([1]).expect([2]);

        let err = transcript.to_positional().unwrap_err();
        assert!(matches!(
            err,
            TranscriptError::NotAlternating {
                index: 1,
                direction: Direction::FromIut
            }
        ));

        let transcript = Transcript::new().inject([1]);
        assert!(transcript.to_positional().is_err());
    }

    #[test]
    fn test_from_events_coalesces_flows() {
        let events = vec![
            event(0, Flow::Sent, &[1]),
            event(1, Flow::Sent, &[2, 3]),
            event(2, Flow::Received, &[]),
            event(3, Flow::Received, &[4]),
            event(4, Flow::Sent, &[5]),
        ];

        let transcript = Transcript::from_events(&events, Perspective::Iut);
        assert_eq!(
            transcript,
            Transcript::new().expect([1, 2, 3]).inject([4]).expect([5])
        );

        let transcript = Transcript::from_events(&events, Perspective::Peer);
        assert_eq!(
            transcript,
            Transcript::new().inject([1, 2, 3]).expect([4]).inject([5])
        );
    }

    #[test]
    fn test_total_len() {
        let transcript = Transcript::new().expect([0; 4]).inject([0; 2]).expect([0; 3]);

        assert_eq!(transcript.total_len(Direction::FromIut), 7);
        assert_eq!(transcript.total_len(Direction::ToIut), 2);
    }

    #[test]
    fn test_first_mismatch() {
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 2, 3]), None);
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 0, 3]), Some(1));
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 2]), Some(2));
        assert_eq!(first_mismatch(&[], &[9]), Some(0));
    }

    #[test]
    fn test_serde_hex_payload() {
        let transcript = Transcript::new().expect([0xde, 0xad]).inject([0x01]);

        let json = serde_json::to_string(&transcript).unwrap();
        assert!(json.contains("\"dead\""));
        assert!(json.contains("\"from_iut\""));

        let decoded: Transcript = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, transcript);
    }
}
