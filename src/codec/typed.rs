use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codec::{Codec, Error, SerializedRecord};
use crate::event::DomainEvent;
use crate::serde::{Json, Serde};

/// [Codec] for strongly-typed Domain Events implementing the `serde` traits.
///
/// The whole event is serialized as the record payload through the
/// configured [Serde] (JSON by default); no separate metadata blob is written.
///
/// Metadata enrichment only touches fields the event type already declares:
/// [Codec::add_metadata] with a key that is not a field of `T` does nothing.
#[derive(Debug)]
pub struct TypedCodec<T, S = Json<T>> {
    serde: S,
    event_type: PhantomData<fn() -> T>,
}

impl<T> Default for TypedCodec<T, Json<T>> {
    fn default() -> Self {
        Self::new(Json::default())
    }
}

impl<T, S> TypedCodec<T, S> {
    /// Creates a new [TypedCodec] using the specified [Serde] for the payload.
    pub fn new(serde: S) -> Self {
        Self {
            serde,
            event_type: PhantomData,
        }
    }
}

impl<T, S> Clone for TypedCodec<T, S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self::new(self.serde.clone())
    }
}

impl<T, S> Codec<T> for TypedCodec<T, S>
where
    T: DomainEvent + Serialize + DeserializeOwned,
    S: Serde<T>,
{
    fn encode(&self, event: &T) -> Result<SerializedRecord, Error> {
        let data = self.serde.serialize(event).map_err(|source| Error::Encode {
            event_id: event.event_id().to_owned(),
            source,
        })?;

        Ok(SerializedRecord {
            event_id: event.event_id().to_owned(),
            event_type: event.event_type().to_owned(),
            data,
            metadata: Vec::new(),
        })
    }

    fn decode(&self, record: SerializedRecord) -> Result<T, Error> {
        self.serde
            .deserialize(&record.data)
            .map_err(|source| Error::Decode {
                event_id: record.event_id,
                source,
            })
    }

    fn add_metadata(&self, event: &mut T, key: &str, value: Value) {
        let mut fields = match serde_json::to_value(&*event) {
            Ok(Value::Object(fields)) if fields.contains_key(key) => fields,
            _ => return,
        };

        fields.insert(key.to_owned(), value);

        match serde_json::from_value(Value::Object(fields)) {
            Ok(enriched) => *event = enriched,
            Err(err) => tracing::trace!(
                event_id = event.event_id(),
                key,
                error = %err,
                "metadata value does not fit the event field, skipping"
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderCreated {
        event_id: String,
        order_id: u64,
        customer_id: Option<u64>,
        lines: Vec<(String, u32)>,
    }

    impl DomainEvent for OrderCreated {
        fn event_id(&self) -> &str {
            &self.event_id
        }

        fn event_type(&self) -> &str {
            "OrderCreated"
        }
    }

    fn order_created() -> OrderCreated {
        OrderCreated {
            event_id: "b2d506fd-409d-4ec7-b02f-c6d2295c7edd".to_owned(),
            order_id: 7,
            customer_id: None,
            lines: vec![("A-1".to_owned(), 2), ("B-7".to_owned(), 1)],
        }
    }

    #[test]
    fn decode_reproduces_encoded_event() {
        let codec = TypedCodec::<OrderCreated>::default();
        let event = order_created();

        let record = codec.encode(&event).expect("encoding should not fail");
        assert_eq!("OrderCreated", record.event_type);
        assert_eq!(event.event_id, record.event_id);
        assert!(record.metadata.is_empty());

        assert_eq!(event, codec.decode(record).expect("decoding should not fail"));
    }

    #[test]
    fn add_metadata_sets_existing_fields() {
        let codec = TypedCodec::<OrderCreated>::default();
        let mut event = order_created();

        codec.add_metadata(&mut event, "customer_id", json!(123));

        assert_eq!(Some(123), event.customer_id);
    }

    #[test]
    fn add_metadata_ignores_unknown_fields_and_mismatching_values() {
        let codec = TypedCodec::<OrderCreated>::default();
        let mut event = order_created();

        codec.add_metadata(&mut event, "timestamp", json!("1970-01-01T00:00:00Z"));
        codec.add_metadata(&mut event, "order_id", json!("not a number"));

        assert_eq!(order_created(), event);
    }
}
