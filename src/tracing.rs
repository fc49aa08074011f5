//! Module containing some extension traits to support code instrumentation
//! using the `tracing` crate.

use tracing::instrument;

use crate::codec::SerializedRecord;
use crate::repository::{Error, Recorded, Repository, Start};
use crate::version::ExpectedVersion;

/// [`Repository`] type wrapper that provides instrumentation
/// features through the `tracing` crate.
#[derive(Debug, Clone)]
pub struct InstrumentedRepository<R> {
    inner: R,
}

impl<R> InstrumentedRepository<R> {
    /// Returns the wrapped [`Repository`].
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> Repository for InstrumentedRepository<R>
where
    R: Repository,
{
    #[instrument(
        name = "Repository.append_to_stream",
        err,
        skip(self, records),
        fields(records = records.len())
    )]
    fn append_to_stream(
        &self,
        records: Vec<SerializedRecord>,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        self.inner.append_to_stream(records, stream, expected)
    }

    #[instrument(name = "Repository.link_to_stream", err, skip(self))]
    fn link_to_stream(
        &self,
        event_id: &str,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        self.inner.link_to_stream(event_id, stream, expected)
    }

    #[instrument(name = "Repository.delete_stream", err, skip(self))]
    fn delete_stream(&self, stream: &str) -> Result<(), Error> {
        self.inner.delete_stream(stream)
    }

    #[instrument(name = "Repository.has_event", ret, err, skip(self))]
    fn has_event(&self, event_id: &str) -> Result<bool, Error> {
        self.inner.has_event(event_id)
    }

    #[instrument(name = "Repository.last_stream_event", err, skip(self))]
    fn last_stream_event(&self, stream: &str) -> Result<Option<Recorded>, Error> {
        self.inner.last_stream_event(stream)
    }

    #[instrument(name = "Repository.read_event", err, skip(self))]
    fn read_event(&self, event_id: &str) -> Result<SerializedRecord, Error> {
        self.inner.read_event(event_id)
    }

    #[instrument(name = "Repository.read_events_forward", err, skip(self))]
    fn read_events_forward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<Recorded>, Error> {
        self.inner.read_events_forward(stream, start, count)
    }

    #[instrument(name = "Repository.read_events_backward", err, skip(self))]
    fn read_events_backward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<Recorded>, Error> {
        self.inner.read_events_backward(stream, start, count)
    }

    #[instrument(name = "Repository.get_all_streams", ret, err, skip(self))]
    fn get_all_streams(&self) -> Result<Vec<String>, Error> {
        self.inner.get_all_streams()
    }
}

/// Extension trait for any [`Repository`] type to provide
/// instrumentation features through the `tracing` crate.
pub trait RepositoryExt: Repository + Sized {
    /// Returns an instrumented version of the [`Repository`] instance.
    fn with_tracing(self) -> InstrumentedRepository<Self> {
        InstrumentedRepository { inner: self }
    }
}

impl<R> RepositoryExt for R where R: Repository {}
