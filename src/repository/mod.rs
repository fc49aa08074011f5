//! The storage contract the event store core relies upon, and an
//! [in-memory implementation][InMemory] of it.
//!
//! A [Repository] keeps a single, global, append-only log of
//! [SerializedRecord]s and any number of named Event Streams indexing into
//! it. Streams do not own events: linking an event to another stream only
//! adds an index entry.
//!
//! Relational engines are expected to use two tables: a global events table
//! keyed by event id, and a stream index keyed by `(stream, position)` with a
//! uniqueness constraint on that pair, a reference to the event id and a
//! composite index on `(stream, position)` for ordered range reads.

use std::sync::Arc;

use crate::codec::SerializedRecord;
use crate::version::{ConflictError, ExpectedVersion, Position};

mod inmemory;

pub use inmemory::InMemory;

/// Name of the implicit stream containing every event ever appended,
/// in global append order.
pub const GLOBAL_STREAM: &str = "all";

/// Number of events fetched per repository call when a whole stream is read.
pub const PAGE_SIZE: usize = 100;

/// All possible error types returned by a [Repository].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The expected version did not match the stream state; nothing has been written.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// An event with the same id already exists somewhere in the log.
    #[error("event '{0}' has already been appended")]
    DuplicateEvent(String),

    /// The event is already part of the target stream.
    #[error("event '{event_id}' is already linked to stream '{stream}'")]
    EventDuplicatedInStream {
        /// Id of the linked event.
        event_id: String,
        /// Target stream of the link.
        stream: String,
    },

    /// No event with the specified id exists in the log.
    #[error("event '{0}' not found")]
    EventNotFound(String),

    /// The stream name is empty, or reserved for the operation requested.
    #[error("invalid stream name '{0}'")]
    InvalidStreamName(String),

    /// The expectation cannot be used on the requested stream.
    #[error("expected version {expected} cannot be used on stream '{stream}'")]
    InvalidExpectedVersion {
        /// The stream the operation targeted.
        stream: String,
        /// The expectation passed by the caller.
        expected: ExpectedVersion,
    },

    /// Another event already occupies the position in the stream.
    #[error("position {position} of stream '{stream}' is already taken")]
    PositionOccupied {
        /// The stream the index entry was destined to.
        stream: String,
        /// The occupied position.
        position: Position,
    },

    /// The stream has no positions left for the events being written.
    #[error("stream '{0}' has no positions left")]
    PositionOverflow(String),

    /// Error returned when the storage engine itself has failed.
    #[error("repository failed, an error occurred: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Specifies where a ranged read starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Start {
    /// From the beginning of the stream when reading forward,
    /// from its end when reading backward.
    #[default]
    Head,

    /// Strictly after the position when reading forward,
    /// strictly before it when reading backward.
    Position(Position),
}

/// Direction of a ranged read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending positions.
    #[default]
    Forward,
    /// Descending positions.
    Backward,
}

/// A [SerializedRecord] together with its position in the stream it was read from.
///
/// Records read from the [GLOBAL_STREAM] carry their global log position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    /// Position of the record in the stream that has been read.
    pub position: Position,
    /// The record itself.
    pub record: SerializedRecord,
}

/// Append-only event log with named, position-indexed streams.
///
/// Every method is its own atomic unit: on error, no partial state
/// of the call is ever observable by other callers.
pub trait Repository: Send + Sync {
    /// Appends the records to the global log and, unless `stream` is the
    /// [GLOBAL_STREAM], to the named stream, at consecutive positions
    /// following the current last one.
    ///
    /// # Errors
    ///
    /// [Error::Conflict] on an expectation mismatch, [Error::DuplicateEvent]
    /// when any of the ids already exists. In both cases nothing is written.
    fn append_to_stream(
        &self,
        records: Vec<SerializedRecord>,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error>;

    /// Adds an already appended event to another stream.
    ///
    /// # Errors
    ///
    /// [Error::EventNotFound] if the id is unknown, [Error::Conflict] on an
    /// expectation mismatch, [Error::EventDuplicatedInStream] if the event
    /// is already part of `stream`.
    fn link_to_stream(
        &self,
        event_id: &str,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error>;

    /// Removes the stream index. Events stay in the global log.
    fn delete_stream(&self, stream: &str) -> Result<(), Error>;

    /// Returns whether an event with the specified id has been appended.
    fn has_event(&self, event_id: &str) -> Result<bool, Error>;

    /// Returns the record with the highest position in the stream, if any.
    fn last_stream_event(&self, stream: &str) -> Result<Option<Recorded>, Error>;

    /// Returns the record with the specified id.
    ///
    /// # Errors
    ///
    /// [Error::EventNotFound] if the id is unknown.
    fn read_event(&self, event_id: &str) -> Result<SerializedRecord, Error>;

    /// Reads up to `count` records of the stream by ascending position.
    fn read_events_forward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<Recorded>, Error>;

    /// Reads up to `count` records of the stream by descending position.
    fn read_events_backward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<Recorded>, Error>;

    /// Reads up to `count` records of the global log in append order.
    fn read_all_streams_forward(&self, start: Start, count: usize) -> Result<Vec<Recorded>, Error> {
        self.read_events_forward(GLOBAL_STREAM, start, count)
    }

    /// Reads up to `count` records of the global log in reverse append order.
    fn read_all_streams_backward(&self, start: Start, count: usize) -> Result<Vec<Recorded>, Error> {
        self.read_events_backward(GLOBAL_STREAM, start, count)
    }

    /// Returns the names of all the streams: the [GLOBAL_STREAM] first,
    /// followed by the named streams in order of creation.
    fn get_all_streams(&self) -> Result<Vec<String>, Error>;

    /// Reads the ranged page of the stream in the specified direction.
    fn read_events(
        &self,
        stream: &str,
        direction: Direction,
        start: Start,
        count: usize,
    ) -> Result<Vec<Recorded>, Error> {
        match direction {
            Direction::Forward => self.read_events_forward(stream, start, count),
            Direction::Backward => self.read_events_backward(stream, start, count),
        }
    }

    /// Reads the whole stream by ascending position.
    fn read_stream_events_forward(&self, stream: &str) -> Result<Vec<Recorded>, Error> {
        read_whole_stream(self, stream, Direction::Forward)
    }

    /// Reads the whole stream by descending position.
    fn read_stream_events_backward(&self, stream: &str) -> Result<Vec<Recorded>, Error> {
        read_whole_stream(self, stream, Direction::Backward)
    }
}

fn read_whole_stream<R>(
    repository: &R,
    stream: &str,
    direction: Direction,
) -> Result<Vec<Recorded>, Error>
where
    R: Repository + ?Sized,
{
    let mut records = Vec::new();
    let mut start = Start::Head;

    loop {
        let page = repository.read_events(stream, direction, start, PAGE_SIZE)?;
        let exhausted = page.len() < PAGE_SIZE;

        if let Some(last) = page.last() {
            start = Start::Position(last.position);
        }

        records.extend(page);

        if exhausted {
            return Ok(records);
        }
    }
}

impl<R> Repository for Arc<R>
where
    R: Repository + ?Sized,
{
    fn append_to_stream(
        &self,
        records: Vec<SerializedRecord>,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        (**self).append_to_stream(records, stream, expected)
    }

    fn link_to_stream(
        &self,
        event_id: &str,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        (**self).link_to_stream(event_id, stream, expected)
    }

    fn delete_stream(&self, stream: &str) -> Result<(), Error> {
        (**self).delete_stream(stream)
    }

    fn has_event(&self, event_id: &str) -> Result<bool, Error> {
        (**self).has_event(event_id)
    }

    fn last_stream_event(&self, stream: &str) -> Result<Option<Recorded>, Error> {
        (**self).last_stream_event(stream)
    }

    fn read_event(&self, event_id: &str) -> Result<SerializedRecord, Error> {
        (**self).read_event(event_id)
    }

    fn read_events_forward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<Recorded>, Error> {
        (**self).read_events_forward(stream, start, count)
    }

    fn read_events_backward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<Recorded>, Error> {
        (**self).read_events_backward(stream, start, count)
    }

    fn read_all_streams_forward(&self, start: Start, count: usize) -> Result<Vec<Recorded>, Error> {
        (**self).read_all_streams_forward(start, count)
    }

    fn read_all_streams_backward(&self, start: Start, count: usize) -> Result<Vec<Recorded>, Error> {
        (**self).read_all_streams_backward(start, count)
    }

    fn get_all_streams(&self) -> Result<Vec<String>, Error> {
        (**self).get_all_streams()
    }
}
