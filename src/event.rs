//! Module `event` contains the [DomainEvent] abstraction and the default,
//! schemaless [Event] type used by the [JSON codec][crate::codec::JsonCodec].

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a schemaless [Event]: field names mapped to JSON values,
/// possibly nested.
pub type Data = serde_json::Map<String, Value>;

/// Additional context attached to an [Event], such as timestamps or
/// correlation ids.
pub type Metadata = serde_json::Map<String, Value>;

/// Represents an occurrence in the system relevant for the domain,
/// as seen by the event store.
///
/// The event id must be unique across the whole log: appending the same id
/// twice is always a conflict. The event type is the tag used by the
/// [Broker][crate::broker::Broker] to route the event to its subscribers.
pub trait DomainEvent: Debug + Send + Sync + 'static {
    /// Returns the globally unique id of the event.
    fn event_id(&self) -> &str;

    /// Returns the type tag of the event, e.g. `"OrderCreated"`.
    fn event_type(&self) -> &str;
}

/// Default Domain Event type, carrying an arbitrary JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique event id.
    pub event_id: String,
    /// Type tag of the event.
    pub event_type: String,
    /// Immutable payload of the event.
    pub data: Data,
    /// Mutable metadata, enriched when the event gets published.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Event {
    /// Creates a new [Event] with a random (UUID v4) id and empty metadata.
    pub fn new(event_type: impl Into<String>, data: Data) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            data,
            metadata: Metadata::default(),
        }
    }

    /// Replaces the event id with the one specified.
    #[must_use]
    pub fn with_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    /// Adds a new entry in the [Event]'s [Metadata].
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl DomainEvent for Event {
    fn event_id(&self) -> &str {
        &self.event_id
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }
}

// Metadata does not take part in equality: it is enriched on publish,
// while id, type and payload never change once appended.
impl PartialEq for Event {
    fn eq(&self, other: &Event) -> bool {
        self.event_id == other.event_id
            && self.event_type == other.event_type
            && self.data == other.data
    }
}

impl Eq for Event {}
