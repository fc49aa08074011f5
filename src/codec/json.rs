use serde_json::Value;

use crate::codec::{Codec, Error, SerializedRecord};
use crate::event::{Data, Event, Metadata};
use crate::serde::{Deserializer, Json, Serializer};

/// Default [Codec] for the schemaless [Event] type: both payload and
/// metadata are stored as JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    data: Json<Data>,
    metadata: Json<Metadata>,
}

impl Codec<Event> for JsonCodec {
    fn encode(&self, event: &Event) -> Result<SerializedRecord, Error> {
        let encode_err = |source: anyhow::Error| Error::Encode {
            event_id: event.event_id.clone(),
            source,
        };

        Ok(SerializedRecord {
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            data: self.data.serialize(&event.data).map_err(encode_err)?,
            metadata: self.metadata.serialize(&event.metadata).map_err(encode_err)?,
        })
    }

    fn decode(&self, record: SerializedRecord) -> Result<Event, Error> {
        let decode_err = |source: anyhow::Error| Error::Decode {
            event_id: record.event_id.clone(),
            source,
        };

        let data = self.data.deserialize(&record.data).map_err(decode_err)?;

        // Records written by codecs that carry no metadata use an empty blob.
        let metadata = if record.metadata.is_empty() {
            Metadata::default()
        } else {
            self.metadata
                .deserialize(&record.metadata)
                .map_err(decode_err)?
        };

        Ok(Event {
            event_id: record.event_id,
            event_type: record.event_type,
            data,
            metadata,
        })
    }

    fn add_metadata(&self, event: &mut Event, key: &str, value: Value) {
        event.metadata.entry(key).or_insert(value);
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn order_created() -> Event {
        let data = json!({
            "order_id": 42,
            "customer": { "name": "Jane", "tags": ["vip", "returning"] },
            "lines": [{ "sku": "A-1", "qty": 2 }, { "sku": "B-7", "qty": 1 }],
        });

        Event::new("OrderCreated", data.as_object().cloned().unwrap_or_default())
            .with_metadata("request_id", "req-1")
    }

    #[test]
    fn decode_reproduces_encoded_event_with_nested_data() {
        let codec = JsonCodec::default();
        let event = order_created();

        let record = codec.encode(&event).expect("encoding should not fail");
        assert_eq!(event.event_id, record.event_id);
        assert_eq!("OrderCreated", record.event_type);

        let decoded = codec.decode(record).expect("decoding should not fail");
        assert_eq!(event, decoded);
        assert_eq!(event.data, decoded.data);
        assert_eq!(event.metadata, decoded.metadata);
    }

    #[test]
    fn add_metadata_keeps_values_set_by_the_caller() {
        let codec = JsonCodec::default();
        let mut event = order_created();

        codec.add_metadata(&mut event, "request_id", json!("req-2"));
        codec.add_metadata(&mut event, "timestamp", json!("1970-01-01T00:00:00+00:00"));

        assert_eq!(Some(&json!("req-1")), event.metadata.get("request_id"));
        assert_eq!(
            Some(&json!("1970-01-01T00:00:00+00:00")),
            event.metadata.get("timestamp")
        );
    }

    #[test]
    fn empty_metadata_blob_decodes_to_empty_metadata() {
        let record = SerializedRecord {
            event_id: "e-1".to_owned(),
            event_type: "OrderCreated".to_owned(),
            data: b"{}".to_vec(),
            metadata: Vec::new(),
        };

        let event = JsonCodec::default()
            .decode(record)
            .expect("decoding should not fail");

        assert!(event.metadata.is_empty());
    }

    #[test]
    fn decode_fails_on_malformed_payload() {
        let record = SerializedRecord {
            event_id: "e-1".to_owned(),
            event_type: "OrderCreated".to_owned(),
            data: b"[1, 2".to_vec(),
            metadata: Vec::new(),
        };

        let err = JsonCodec::default()
            .decode(record)
            .expect_err("malformed payload should fail");

        assert!(matches!(err, Error::Decode { ref event_id, .. } if event_id == "e-1"));
    }
}
