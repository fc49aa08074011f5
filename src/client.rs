//! The [Client] facade: publishes Domain Events to a [Repository] through a
//! [Codec], and dispatches them to subscribers through a [Broker].
//!
//! Most applications hold a single [Client] per process, shared between
//! threads.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use serde_json::Value;

use crate::broker::{self, Broker, Dispatcher, Subscriber, Subscriptions, Unsubscribe};
use crate::clock::{Clock, SystemClock};
use crate::codec::{self, Codec, JsonCodec};
use crate::config::Config;
use crate::event::{DomainEvent, Event, Metadata};
use crate::repository::{self, Repository, Start};
use crate::specification::Specification;
use crate::version::{ConflictError, ExpectedVersion};

/// Metadata key the publish time is recorded under.
pub const TIMESTAMP_KEY: &str = "timestamp";

type MetadataProvider = dyn Fn() -> Metadata + Send + Sync;

/// All possible errors returned by a [Client].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error returned by the [Repository].
    #[error(transparent)]
    Repository(#[from] repository::Error),

    /// Error returned by the [Codec].
    #[error(transparent)]
    Codec(#[from] codec::Error),

    /// Error returned while registering or dispatching to subscribers.
    #[error(transparent)]
    Subscription(#[from] broker::Error),
}

impl Error {
    /// Returns the version conflict that caused the error, if any.
    pub fn conflict(&self) -> Option<&ConflictError> {
        match self {
            Error::Repository(repository::Error::Conflict(conflict)) => Some(conflict),
            _ => None,
        }
    }
}

/// Builder for a [Client].
pub struct ClientBuilder<E> {
    repository: Arc<dyn Repository>,
    codec: Arc<dyn Codec<E>>,
    broker: Broker<E>,
    clock: Arc<dyn Clock>,
    metadata_provider: Option<Arc<MetadataProvider>>,
    config: Config,
}

impl<E> Debug for ClientBuilder<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ClientBuilder")
            .field("clock", &self.clock)
            .field("metadata_provider", &self.metadata_provider.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl<E> ClientBuilder<E>
where
    E: DomainEvent,
{
    /// Starts building a [Client] on top of the specified [Repository] and [Codec].
    pub fn new(repository: impl Repository + 'static, codec: impl Codec<E> + 'static) -> Self {
        Self {
            repository: Arc::new(repository),
            codec: Arc::new(codec),
            broker: Broker::default(),
            clock: Arc::new(SystemClock),
            metadata_provider: None,
            config: Config::default(),
        }
    }

    /// Sets the [Clock] used to timestamp published events.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets the [Dispatcher] used to invoke subscribers.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher<E> + 'static) -> Self {
        self.broker = Broker::new(dispatcher);
        self
    }

    /// Sets a provider of metadata entries added to every published event.
    #[must_use]
    pub fn metadata_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Metadata + Send + Sync + 'static,
    {
        self.metadata_provider = Some(Arc::new(provider));
        self
    }

    /// Sets the [Config] of the [Client].
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Builds the [Client].
    pub fn build(self) -> Client<E> {
        Client {
            repository: self.repository,
            codec: self.codec,
            broker: self.broker,
            clock: self.clock,
            metadata_provider: self.metadata_provider,
            page_size: self.config.page_size(),
        }
    }
}

/// Entry point to publish, read and subscribe to Domain Events.
///
/// Cloning a [Client] returns a handle to the same repository and subscribers.
pub struct Client<E = Event> {
    repository: Arc<dyn Repository>,
    codec: Arc<dyn Codec<E>>,
    broker: Broker<E>,
    clock: Arc<dyn Clock>,
    metadata_provider: Option<Arc<MetadataProvider>>,
    page_size: usize,
}

impl<E> Clone for Client<E> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            codec: Arc::clone(&self.codec),
            broker: self.broker.clone(),
            clock: Arc::clone(&self.clock),
            metadata_provider: self.metadata_provider.clone(),
            page_size: self.page_size,
        }
    }
}

impl<E> Debug for Client<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Client")
            .field("broker", &self.broker)
            .field("clock", &self.clock)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Client<Event> {
    /// Starts building a [Client] for schemaless [Event]s, using the [JsonCodec].
    pub fn builder(repository: impl Repository + 'static) -> ClientBuilder<Event> {
        ClientBuilder::new(repository, JsonCodec::default())
    }
}

impl<E> Client<E>
where
    E: DomainEvent,
{
    fn enrich(&self, event: &mut E) {
        let timestamp = self.clock.now().to_rfc3339();
        self.codec
            .add_metadata(event, TIMESTAMP_KEY, Value::String(timestamp));

        if let Some(provider) = &self.metadata_provider {
            for (key, value) in provider() {
                self.codec.add_metadata(event, &key, value);
            }
        }
    }

    fn store(
        &self,
        events: &mut [E],
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        for event in events.iter_mut() {
            self.enrich(event);
        }

        let records = events
            .iter()
            .map(|event| self.codec.encode(event))
            .collect::<Result<Vec<_>, _>>()?;

        self.repository.append_to_stream(records, stream, expected)?;

        Ok(())
    }

    fn decode_all(&self, recorded: Vec<repository::Recorded>) -> Result<Vec<E>, Error> {
        recorded
            .into_iter()
            .map(|recorded| self.codec.decode(recorded.record).map_err(Error::from))
            .collect()
    }

    /// Appends the event to the stream, then dispatches it to the subscribers.
    ///
    /// The event is enriched with a `timestamp` and the provider's metadata
    /// before being encoded; subscribers receive the enriched event.
    ///
    /// # Errors
    ///
    /// Nothing is dispatched if the append fails. A failing subscriber
    /// stops the dispatch and its error is returned, while the event
    /// stays appended.
    pub fn publish(&self, event: E, stream: &str, expected: ExpectedVersion) -> Result<(), Error> {
        self.publish_batch(vec![event], stream, expected)
    }

    /// Appends all the events to the stream in a single call,
    /// then dispatches them to the subscribers in order. Subscribers are
    /// resolved once for the whole batch.
    ///
    /// # Errors
    ///
    /// See [Client::publish].
    pub fn publish_batch(
        &self,
        mut events: Vec<E>,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        self.store(&mut events, stream, expected)?;

        tracing::debug!(stream, %expected, count = events.len(), "events published");

        self.broker.notify_all(&events)?;

        Ok(())
    }

    /// Appends the events to the stream without dispatching them.
    ///
    /// # Errors
    ///
    /// The [Codec] or [Repository] error that prevented the append.
    pub fn append_to_stream(
        &self,
        mut events: Vec<E>,
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        self.store(&mut events, stream, expected)?;

        tracing::debug!(stream, %expected, count = events.len(), "events appended");

        Ok(())
    }

    /// Links already appended events to another stream, in order.
    ///
    /// The expectation is checked on the first link only, and carried
    /// forward for the following ones.
    ///
    /// # Errors
    ///
    /// The first [Repository] error; events linked before it stay linked.
    pub fn link_to_stream(
        &self,
        event_ids: &[&str],
        stream: &str,
        expected: ExpectedVersion,
    ) -> Result<(), Error> {
        let mut expected = expected;

        for event_id in event_ids {
            self.repository.link_to_stream(event_id, stream, expected)?;

            expected = match expected {
                ExpectedVersion::NoStream => ExpectedVersion::Exact(0),
                ExpectedVersion::Exact(position) => position
                    .checked_add(1)
                    .map(ExpectedVersion::Exact)
                    .ok_or_else(|| repository::Error::PositionOverflow(stream.to_owned()))?,
                other => other,
            };
        }

        tracing::debug!(stream, count = event_ids.len(), "events linked");

        Ok(())
    }

    /// Removes the stream. Its events stay in the global stream.
    ///
    /// # Errors
    ///
    /// The [Repository] error, if any.
    pub fn delete_stream(&self, stream: &str) -> Result<(), Error> {
        self.repository.delete_stream(stream)?;

        tracing::debug!(stream, "stream deleted");

        Ok(())
    }

    /// Reads the event with the specified id.
    ///
    /// # Errors
    ///
    /// [repository::Error::EventNotFound] if no such event exists.
    pub fn read_event(&self, event_id: &str) -> Result<E, Error> {
        let record = self.repository.read_event(event_id)?;
        Ok(self.codec.decode(record)?)
    }

    /// Returns whether an event with the specified id has been appended.
    ///
    /// # Errors
    ///
    /// The [Repository] error, if any.
    pub fn has_event(&self, event_id: &str) -> Result<bool, Error> {
        Ok(self.repository.has_event(event_id)?)
    }

    /// Returns the last event of the stream, if any.
    ///
    /// # Errors
    ///
    /// The [Repository] or [Codec] error, if any.
    pub fn last_stream_event(&self, stream: &str) -> Result<Option<E>, Error> {
        self.repository
            .last_stream_event(stream)?
            .map(|recorded| self.codec.decode(recorded.record))
            .transpose()
            .map_err(Error::from)
    }

    /// Reads up to `count` events of the stream by ascending position.
    ///
    /// # Errors
    ///
    /// The [Repository] or [Codec] error, if any.
    pub fn read_events_forward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<E>, Error> {
        self.decode_all(self.repository.read_events_forward(stream, start, count)?)
    }

    /// Reads up to `count` events of the stream by descending position.
    ///
    /// # Errors
    ///
    /// The [Repository] or [Codec] error, if any.
    pub fn read_events_backward(
        &self,
        stream: &str,
        start: Start,
        count: usize,
    ) -> Result<Vec<E>, Error> {
        self.decode_all(self.repository.read_events_backward(stream, start, count)?)
    }

    /// Reads the whole stream by ascending position.
    ///
    /// # Errors
    ///
    /// The [Repository] or [Codec] error, if any.
    pub fn read_stream_events_forward(&self, stream: &str) -> Result<Vec<E>, Error> {
        self.decode_all(self.repository.read_stream_events_forward(stream)?)
    }

    /// Reads the whole stream by descending position.
    ///
    /// # Errors
    ///
    /// The [Repository] or [Codec] error, if any.
    pub fn read_stream_events_backward(&self, stream: &str) -> Result<Vec<E>, Error> {
        self.decode_all(self.repository.read_stream_events_backward(stream)?)
    }

    /// Reads up to `count` events of the global stream in append order.
    ///
    /// # Errors
    ///
    /// The [Repository] or [Codec] error, if any.
    pub fn read_all_streams_forward(&self, start: Start, count: usize) -> Result<Vec<E>, Error> {
        self.decode_all(self.repository.read_all_streams_forward(start, count)?)
    }

    /// Reads up to `count` events of the global stream in reverse append order.
    ///
    /// # Errors
    ///
    /// The [Repository] or [Codec] error, if any.
    pub fn read_all_streams_backward(&self, start: Start, count: usize) -> Result<Vec<E>, Error> {
        self.decode_all(self.repository.read_all_streams_backward(start, count)?)
    }

    /// Returns the names of all the streams, the global one first.
    ///
    /// # Errors
    ///
    /// The [Repository] error, if any.
    pub fn get_all_streams(&self) -> Result<Vec<String>, Error> {
        Ok(self.repository.get_all_streams()?)
    }

    /// Returns a [Specification] to read events with.
    pub fn read(&self) -> Specification<'_, E> {
        Specification::new(&*self.repository, &*self.codec, self.page_size)
    }

    /// Registers the subscriber for events of the specified types.
    ///
    /// # Errors
    ///
    /// [broker::Error::InvalidHandler] if the subscriber cannot be called.
    pub fn subscribe(
        &self,
        subscriber: Subscriber<E>,
        event_types: &[&str],
    ) -> Result<Unsubscribe<E>, Error> {
        Ok(self.broker.subscribe(subscriber, event_types)?)
    }

    /// Registers the subscriber for every event.
    ///
    /// # Errors
    ///
    /// [broker::Error::InvalidHandler] if the subscriber cannot be called.
    pub fn subscribe_to_all_events(&self, subscriber: Subscriber<E>) -> Result<Unsubscribe<E>, Error> {
        Ok(self.broker.subscribe_to_all_events(subscriber)?)
    }

    /// Prepares the block to run with temporary subscriptions, active on
    /// the calling thread only and for the block's duration only.
    ///
    /// Nothing runs until [Within::call] is invoked.
    pub fn within<F, R>(&self, block: F) -> Within<'_, E, F>
    where
        F: FnOnce() -> R,
    {
        Within {
            broker: &self.broker,
            subscriptions: Subscriptions::default(),
            block,
        }
    }
}

/// Block with temporary subscriptions, returned by [Client::within].
pub struct Within<'a, E, F> {
    broker: &'a Broker<E>,
    subscriptions: Subscriptions<E>,
    block: F,
}

impl<E, F> Debug for Within<'_, E, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Within")
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl<E, F> Within<'_, E, F>
where
    E: DomainEvent,
{
    /// Adds a temporary subscriber for events of the specified types.
    ///
    /// # Errors
    ///
    /// [broker::Error::InvalidHandler] if the subscriber cannot be called.
    pub fn subscribe(mut self, subscriber: Subscriber<E>, event_types: &[&str]) -> Result<Self, Error> {
        self.broker.verify(&subscriber)?;
        self.subscriptions.add(subscriber, event_types);
        Ok(self)
    }

    /// Adds a temporary subscriber for every event.
    ///
    /// # Errors
    ///
    /// [broker::Error::InvalidHandler] if the subscriber cannot be called.
    pub fn subscribe_to_all_events(mut self, subscriber: Subscriber<E>) -> Result<Self, Error> {
        self.broker.verify(&subscriber)?;
        self.subscriptions.add_global(subscriber);
        Ok(self)
    }

    /// Runs the block with the temporary subscriptions active, and returns
    /// its result. The subscriptions are removed on every exit path,
    /// unwinding included.
    pub fn call<R>(self) -> R
    where
        F: FnOnce() -> R,
    {
        self.broker.with_scope(self.subscriptions, self.block)
    }
}
