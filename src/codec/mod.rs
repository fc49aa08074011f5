//! Conversion between Domain Events and the [SerializedRecord]s exchanged
//! with a [Repository][crate::repository::Repository].
//!
//! A [Codec] is pluggable: [JsonCodec] handles the schemaless [Event][crate::event::Event],
//! [TypedCodec] any `serde`-enabled event type, and [Registry] routes each
//! event type tag to the codec registered for it.

use serde_json::Value;

mod json;
mod registry;
mod typed;

pub use json::JsonCodec;
pub use registry::Registry;
pub use typed::TypedCodec;

/// Wire shape of a Domain Event, as stored by a [Repository][crate::repository::Repository].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedRecord {
    /// Globally unique event id.
    pub event_id: String,
    /// Type tag of the event.
    pub event_type: String,
    /// Opaque, codec-specific payload.
    pub data: Vec<u8>,
    /// Opaque, codec-specific metadata.
    pub metadata: Vec<u8>,
}

/// All possible errors returned by a [Codec].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No codec has been registered for the event type tag.
    #[error("no codec registered for event type '{0}'")]
    UnknownEventType(String),

    /// The Domain Event could not be turned into a [SerializedRecord].
    #[error("failed to encode event '{event_id}': {source}")]
    Encode {
        /// Id of the event that failed to encode.
        event_id: String,
        /// The underlying serialization error.
        #[source]
        source: anyhow::Error,
    },

    /// The [SerializedRecord] could not be turned back into a Domain Event.
    #[error("failed to decode event '{event_id}': {source}")]
    Decode {
        /// Id of the record that failed to decode.
        event_id: String,
        /// The underlying deserialization error.
        #[source]
        source: anyhow::Error,
    },
}

/// Converts Domain Events of type `E` into [SerializedRecord]s and back.
///
/// Implementations must round-trip: decoding an encoded event reproduces its
/// id, type and data exactly.
pub trait Codec<E>: Send + Sync {
    /// Encodes the Domain Event into its wire shape.
    ///
    /// # Errors
    ///
    /// [Error::Encode] if the event payload cannot be serialized.
    fn encode(&self, event: &E) -> Result<SerializedRecord, Error>;

    /// Decodes a [SerializedRecord] back into a Domain Event.
    ///
    /// # Errors
    ///
    /// [Error::Decode] if the record payload cannot be deserialized.
    fn decode(&self, record: SerializedRecord) -> Result<E, Error>;

    /// Enriches the event with a metadata entry before it gets encoded.
    ///
    /// Event representations without a field for `key` are left untouched,
    /// which is also what the default implementation does.
    fn add_metadata(&self, event: &mut E, key: &str, value: Value) {
        let _ = (event, key, value);
    }
}

impl<E, C> Codec<E> for std::sync::Arc<C>
where
    C: Codec<E> + ?Sized,
{
    fn encode(&self, event: &E) -> Result<SerializedRecord, Error> {
        (**self).encode(event)
    }

    fn decode(&self, record: SerializedRecord) -> Result<E, Error> {
        (**self).decode(record)
    }

    fn add_metadata(&self, event: &mut E, key: &str, value: Value) {
        (**self).add_metadata(event, key, value);
    }
}
