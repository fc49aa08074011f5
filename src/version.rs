//! Contains the types necessary for Optimistic Locking on Event Streams.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Zero-based, dense ordinal of an event within a single Event Stream.
///
/// Positions of a stream are assigned consecutively on append, starting at `0`,
/// and are the only ordering key used when reading a stream back.
pub type Position = u64;

/// Used to set a specific expectation on the current state of an Event Stream
/// when appending or linking events to it.
///
/// It allows for optimistic locking, avoiding data races
/// when modifying the same stream at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// The repository computes the next position from the last position
    /// it currently tracks for the stream.
    Auto,
    /// The stream must not exist yet, i.e. this is the first write to it.
    NoStream,
    /// Disables any kind of optimistic locking check.
    #[default]
    Any,
    /// The stream's last position must be exactly the one specified.
    Exact(Position),
}

impl ExpectedVersion {
    /// Returns `true` if this expectation performs no conflict detection at all.
    pub fn is_any(self) -> bool {
        matches!(self, ExpectedVersion::Any)
    }

    /// Checks the expectation against the `current` last position of `stream`.
    ///
    /// # Errors
    ///
    /// A [ConflictError] is returned when the stream state does not match
    /// the expectation.
    pub fn check(self, stream: &str, current: Option<Position>) -> Result<(), ConflictError> {
        let matches = match self {
            ExpectedVersion::Any | ExpectedVersion::Auto => true,
            ExpectedVersion::NoStream => current.is_none(),
            ExpectedVersion::Exact(expected) => current == Some(expected),
        };

        if matches {
            Ok(())
        } else {
            Err(ConflictError {
                stream: stream.to_owned(),
                expected: self,
                actual: current,
            })
        }
    }
}

/// Returns the position following `current`, the last position of a stream,
/// or `None` if the stream has no positions left.
pub fn next_position(current: Option<Position>) -> Option<Position> {
    match current {
        Some(last) => last.checked_add(1),
        None => Some(0),
    }
}

impl Display for ExpectedVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ExpectedVersion::Auto => write!(f, "auto"),
            ExpectedVersion::NoStream => write!(f, "no stream"),
            ExpectedVersion::Any => write!(f, "any"),
            ExpectedVersion::Exact(position) => write!(f, "{}", position),
        }
    }
}

/// This error is returned by a function when a version conflict error has
/// been detected on an Event Stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("wrong expected version on stream '{stream}', expected: {expected}, last position found: {}", DisplayPosition(.actual))]
pub struct ConflictError {
    /// The Event Stream the conflict was detected on.
    pub stream: String,

    /// The expectation that was passed by the caller.
    pub expected: ExpectedVersion,

    /// The actual last position of the stream, `None` if the stream is empty.
    pub actual: Option<Position>,
}

struct DisplayPosition<'a>(&'a Option<Position>);

impl Display for DisplayPosition<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.0 {
            Some(position) => write!(f, "{}", position),
            None => write!(f, "none"),
        }
    }
}
