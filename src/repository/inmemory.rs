use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::SerializedRecord;
use crate::repository::{Error, Recorded, Repository, Start, GLOBAL_STREAM};
use crate::version::{self, ExpectedVersion, Position};

#[derive(Debug)]
struct StreamIndex {
    // Identity of the first index row of the stream, used to list
    // streams in order of creation.
    first_row: u64,
    entries: BTreeMap<Position, usize>,
    members: HashSet<usize>,
}

#[derive(Debug, Default)]
struct Backend {
    log: Vec<SerializedRecord>,
    offsets: HashMap<String, usize>,
    streams: HashMap<String, StreamIndex>,
    next_row: u64,
}

impl Backend {
    fn last_position(&self, stream: &str) -> Option<Position> {
        self.streams
            .get(stream)
            .and_then(|index| index.entries.keys().next_back().copied())
    }

    // Checks `expected` and returns the position of the first of `count`
    // new entries of `stream`.
    fn reserve(
        &self,
        stream: &str,
        expected: ExpectedVersion,
        count: usize,
    ) -> Result<Position, Error> {
        let current = self.last_position(stream);
        expected.check(stream, current)?;

        version::next_position(current)
            .filter(|next| {
                let extra = count.saturating_sub(1) as Position;
                next.checked_add(extra).is_some()
            })
            .ok_or_else(|| Error::PositionOverflow(stream.to_owned()))
    }

    fn push(&mut self, record: SerializedRecord) -> usize {
        let offset = self.log.len();
        self.offsets.insert(record.event_id.clone(), offset);
        self.log.push(record);
        offset
    }

    fn index(&mut self, stream: &str, position: Position, offset: usize) {
        let row = self.next_row;
        self.next_row += 1;

        let index = self
            .streams
            .entry(stream.to_owned())
            .or_insert_with(|| StreamIndex {
                first_row: row,
                entries: BTreeMap::new(),
                members: HashSet::new(),
            });

        index.entries.insert(position, offset);
        index.members.insert(offset);
    }

    fn recorded(&self, position: Position, offset: usize) -> Recorded {
        Recorded {
            position,
            record: self.log[offset].clone(),
        }
    }

    fn read_log(&self, forward: bool, start: Start, count: usize) -> Vec<Recorded> {
        let len = self.log.len() as Position;

        let offsets: Box<dyn Iterator<Item = Position>> = match (forward, start) {
            (true, Start::Head) => Box::new(0..len),
            (true, Start::Position(after)) => Box::new(after.saturating_add(1)..len),
            (false, Start::Head) => Box::new((0..len).rev()),
            (false, Start::Position(before)) => Box::new((0..before.min(len)).rev()),
        };

        offsets
            .take(count)
            .map(|position| self.recorded(position, position as usize))
            .collect()
    }

    fn read_stream(&self, stream: &str, forward: bool, start: Start, count: usize) -> Vec<Recorded> {
        if stream == GLOBAL_STREAM {
            return self.read_log(forward, start, count);
        }

        let index = match self.streams.get(stream) {
            Some(index) => index,
            None => return Vec::new(),
        };

        let range = match (forward, start) {
            (_, Start::Head) => index.entries.range::<Position, _>(..),
            (true, Start::Position(after)) => {
                index.entries.range((Bound::Excluded(after), Bound::Unbounded))
            }
            (false, Start::Position(before)) => index.entries.range(..before),
        };

        let entries: Box<dyn Iterator<Item = (&Position, &usize)> + '_> = if forward {
            Box::new(range)
        } else {
            Box::new(range.rev())
        };

        entries
            .take(count)
            .map(|(&position, &offset)| self.recorded(position, offset))
            .collect()
    }
}

fn validate_stream_name(stream: &str) -> Result<(), Error> {
    if stream.trim().is_empty() {
        return Err(Error::InvalidStreamName(stream.to_owned()));
    }

    Ok(())
}

// Operations that maintain a named index cannot target the global stream.
fn validate_named_stream(stream: &str) -> Result<(), Error> {
    validate_stream_name(stream)?;

    if stream == GLOBAL_STREAM {
        return Err(Error::InvalidStreamName(stream.to_owned()));
    }

    Ok(())
}

/// In-memory implementation of the [Repository] trait,
/// backed by a thread-safe log and per-stream ordered indexes.
///
/// Cloning an [InMemory] repository yields a handle to the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemory {
    backend: Arc<RwLock<Backend>>,
}

impl InMemory {
    /// Backfills a single stream index entry at an explicit position,
    /// appending the record to the global log if it is not there yet.
    ///
    /// Unlike [Repository::append_to_stream], no expected version is
    /// checked and positions may be written in any order. Stream positions
    /// are expected to be dense: a backfill must eventually cover every
    /// position from `0` up to the highest one imported. Appends always
    /// continue after the highest position, so gaps left behind are never
    /// filled by later writes.
    ///
    /// # Errors
    ///
    /// [Error::PositionOccupied] if the stream already has an event at
    /// `position`, [Error::EventDuplicatedInStream] if the event is already
    /// part of the stream.
    pub fn import(
        &self,
        stream: &str,
        position: Position,
        record: SerializedRecord,
    ) -> Result<(), Error> {
        validate_named_stream(stream)?;

        let mut backend = self.backend.write();

        if let Some(index) = backend.streams.get(stream) {
            if index.entries.contains_key(&position) {
                return Err(Error::PositionOccupied {
                    stream: stream.to_owned(),
                    position,
                });
            }

            let linked = backend
                .offsets
                .get(&record.event_id)
                .map_or(false, |offset| index.members.contains(offset));

            if linked {
                return Err(Error::EventDuplicatedInStream {
                    event_id: record.event_id,
                    stream: stream.to_owned(),
                });
            }
        }

        let existing = backend.offsets.get(&record.event_id).copied();
        let offset = match existing {
            Some(offset) => offset,
            None => backend.push(record),
        };

        backend.index(stream, position, offset);

        Ok(())
    }
}

impl Repository for InMemory {
    fn append_to_stream(
        &self,
        records: Vec<SerializedRecord>,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        validate_stream_name(stream)?;

        let global = stream == GLOBAL_STREAM;
        if global && !expected.is_any() {
            return Err(Error::InvalidExpectedVersion {
                stream: stream.to_owned(),
                expected,
            });
        }

        let mut backend = self.backend.write();

        let next = backend.reserve(stream, expected, records.len())?;

        {
            let mut batch = HashSet::with_capacity(records.len());
            for record in &records {
                if backend.offsets.contains_key(&record.event_id)
                    || !batch.insert(record.event_id.as_str())
                {
                    return Err(Error::DuplicateEvent(record.event_id.clone()));
                }
            }
        }

        for (i, record) in records.into_iter().enumerate() {
            let offset = backend.push(record);

            if !global {
                backend.index(stream, next + i as Position, offset);
            }
        }

        Ok(())
    }

    fn link_to_stream(
        &self,
        event_id: &str,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        validate_named_stream(stream)?;

        let mut backend = self.backend.write();

        let offset = *backend
            .offsets
            .get(event_id)
            .ok_or_else(|| Error::EventNotFound(event_id.to_owned()))?;

        let next = backend.reserve(stream, expected, 1)?;

        let linked = backend
            .streams
            .get(stream)
            .map_or(false, |index| index.members.contains(&offset));

        if linked {
            return Err(Error::EventDuplicatedInStream {
                event_id: event_id.to_owned(),
                stream: stream.to_owned(),
            });
        }

        backend.index(stream, next, offset);

        Ok(())
    }

    fn delete_stream(&self, stream: &str) -> Result<(), Error> {
        validate_named_stream(stream)?;

        self.backend.write().streams.remove(stream);

        Ok(())
    }

    fn has_event(&self, event_id: &str) -> Result<bool, Error> {
        Ok(self.backend.read().offsets.contains_key(event_id))
    }

    fn last_stream_event(&self, stream: &str) -> Result<Option<Recorded>, Error> {
        validate_stream_name(stream)?;

        Ok(self
            .backend
            .read()
            .read_stream(stream, false, Start::Head, 1)
            .pop())
    }

    fn read_event(&self, event_id: &str) -> Result<SerializedRecord, Error> {
        let backend = self.backend.read();

        backend
            .offsets
            .get(event_id)
            .map(|&offset| backend.log[offset].clone())
            .ok_or_else(|| Error::EventNotFound(event_id.to_owned()))
    }

    fn read_events_forward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<Recorded>, Error> {
        validate_stream_name(stream)?;

        Ok(self.backend.read().read_stream(stream, true, start, count))
    }

    fn read_events_backward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<Recorded>, Error> {
        validate_stream_name(stream)?;

        Ok(self.backend.read().read_stream(stream, false, start, count))
    }

    fn get_all_streams(&self) -> Result<Vec<String>, Error> {
        let backend = self.backend.read();

        let mut named: Vec<_> = backend.streams.iter().collect();
        named.sort_by_key(|(_, index)| index.first_row);

        Ok(std::iter::once(GLOBAL_STREAM.to_owned())
            .chain(named.into_iter().map(|(name, _)| name.clone()))
            .collect())
    }
}
