//! Fluent builder for reading Domain Events back from a [Repository].
//!
//! A [Specification] reads lazily: the [Repository] is queried one page at a
//! time, each page starting right after the position of the last event of
//! the previous one, until a page comes back shorter than requested.
//! Every page reflects what was committed when it was fetched.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::client::Error;
use crate::codec::Codec;
use crate::repository::{Direction, Repository, Start, GLOBAL_STREAM};
use crate::version::Position;

/// Read query against a single stream, or against all of them.
///
/// Obtained through [Client::read][crate::client::Client::read].
pub struct Specification<'a, E> {
    repository: &'a dyn Repository,
    codec: &'a dyn Codec<E>,
    stream: String,
    direction: Direction,
    start: Start,
    limit: Option<usize>,
    page_size: usize,
}

impl<E> Debug for Specification<'_, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Specification")
            .field("stream", &self.stream)
            .field("direction", &self.direction)
            .field("start", &self.start)
            .field("limit", &self.limit)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl<'a, E> Specification<'a, E> {
    pub(crate) fn new(
        repository: &'a dyn Repository,
        codec: &'a dyn Codec<E>,
        page_size: usize,
    ) -> Self {
        Self {
            repository,
            codec,
            stream: GLOBAL_STREAM.to_owned(),
            direction: Direction::Forward,
            start: Start::Head,
            limit: None,
            page_size: page_size.max(1),
        }
    }

    /// Reads from the specified stream.
    #[must_use]
    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    /// Reads from the global stream, in append order. This is the default.
    #[must_use]
    pub fn all_streams(self) -> Self {
        self.stream(GLOBAL_STREAM)
    }

    /// Reads by ascending position. This is the default.
    #[must_use]
    pub fn forward(mut self) -> Self {
        self.direction = Direction::Forward;
        self
    }

    /// Reads by descending position.
    #[must_use]
    pub fn backward(mut self) -> Self {
        self.direction = Direction::Backward;
        self
    }

    /// Starts strictly after the position when reading forward,
    /// strictly before it when reading backward.
    #[must_use]
    pub fn from(mut self, position: Position) -> Self {
        self.start = Start::Position(position);
        self
    }

    /// Starts from the beginning of the stream when reading forward,
    /// or from its end when reading backward. This is the default.
    #[must_use]
    pub fn head(mut self) -> Self {
        self.start = Start::Head;
        self
    }

    /// Reads at most `limit` events in total.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the events in batches of at most `size` events,
    /// one [Repository] call per batch.
    pub fn in_batches(mut self, size: usize) -> Batches<'a, E> {
        self.page_size = size.max(1);

        Batches {
            remaining: self.limit,
            start: self.start,
            done: false,
            spec: self,
        }
    }

    /// Returns the events one by one.
    pub fn each(self) -> Events<'a, E> {
        let page_size = self.page_size;

        Events {
            batches: self.in_batches(page_size),
            current: Vec::new().into_iter(),
        }
    }

    /// Reads all the matching events at once.
    ///
    /// # Errors
    ///
    /// The first error returned by the [Repository] or the [Codec].
    pub fn to_vec(self) -> Result<Vec<E>, Error> {
        self.each().collect()
    }
}

/// Iterator over batches of events, returned by [Specification::in_batches].
///
/// Iteration stops after the first error.
pub struct Batches<'a, E> {
    spec: Specification<'a, E>,
    remaining: Option<usize>,
    start: Start,
    done: bool,
}

impl<E> Debug for Batches<'_, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Batches")
            .field("spec", &self.spec)
            .field("remaining", &self.remaining)
            .field("start", &self.start)
            .field("done", &self.done)
            .finish()
    }
}

impl<E> Iterator for Batches<'_, E> {
    type Item = Result<Vec<E>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let count = match self.remaining {
            Some(0) => {
                self.done = true;
                return None;
            }
            Some(remaining) => remaining.min(self.spec.page_size),
            None => self.spec.page_size,
        };

        let page = match self.spec.repository.read_events(
            &self.spec.stream,
            self.spec.direction,
            self.start,
            count,
        ) {
            Ok(page) => page,
            Err(err) => {
                self.done = true;
                return Some(Err(err.into()));
            }
        };

        if page.len() < count {
            self.done = true;
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(page.len());
        }

        match page.last() {
            Some(last) => self.start = Start::Position(last.position),
            None => return None,
        }

        let codec = self.spec.codec;
        let events = page
            .into_iter()
            .map(|recorded| codec.decode(recorded.record))
            .collect::<Result<Vec<_>, _>>();

        if events.is_err() {
            self.done = true;
        }

        Some(events.map_err(Error::from))
    }
}

/// Iterator over single events, returned by [Specification::each].
pub struct Events<'a, E> {
    batches: Batches<'a, E>,
    current: std::vec::IntoIter<E>,
}

impl<E> Debug for Events<'_, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Events")
            .field("batches", &self.batches)
            .field("buffered", &self.current.len())
            .finish()
    }
}

impl<E> Iterator for Events<'_, E> {
    type Item = Result<E, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.current.next() {
                return Some(Ok(event));
            }

            match self.batches.next()? {
                Ok(batch) => self.current = batch.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
