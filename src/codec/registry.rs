use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use serde_json::Value;

use crate::codec::{Codec, Error, SerializedRecord};
use crate::event::DomainEvent;

/// [Codec] that routes every event to the codec registered for its type tag.
///
/// Records read back with a renamed type tag can be redirected to their
/// current tag through [Registry::alias]; the decoded record carries the
/// current tag.
pub struct Registry<E> {
    codecs: HashMap<String, Arc<dyn Codec<E>>>,
    aliases: HashMap<String, String>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            codecs: HashMap::default(),
            aliases: HashMap::default(),
        }
    }
}

impl<E> Debug for Registry<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut event_types: Vec<_> = self.codecs.keys().collect();
        event_types.sort();

        f.debug_struct("Registry")
            .field("event_types", &event_types)
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl<E> Registry<E>
where
    E: DomainEvent,
{
    /// Registers the codec to use for events with the specified type tag.
    #[must_use]
    pub fn register(mut self, event_type: impl Into<String>, codec: impl Codec<E> + 'static) -> Self {
        self.codecs.insert(event_type.into(), Arc::new(codec));
        self
    }

    /// Decodes records stored with the `legacy` type tag as if they had
    /// been stored with the `current` one.
    #[must_use]
    pub fn alias(mut self, legacy: impl Into<String>, current: impl Into<String>) -> Self {
        self.aliases.insert(legacy.into(), current.into());
        self
    }

    fn codec_for(&self, event_type: &str) -> Result<&dyn Codec<E>, Error> {
        self.codecs
            .get(event_type)
            .map(|codec| &**codec)
            .ok_or_else(|| Error::UnknownEventType(event_type.to_owned()))
    }
}

impl<E> Codec<E> for Registry<E>
where
    E: DomainEvent,
{
    fn encode(&self, event: &E) -> Result<SerializedRecord, Error> {
        self.codec_for(event.event_type())?.encode(event)
    }

    fn decode(&self, mut record: SerializedRecord) -> Result<E, Error> {
        if let Some(current) = self.aliases.get(&record.event_type) {
            record.event_type = current.clone();
        }

        self.codec_for(&record.event_type)?.decode(record)
    }

    fn add_metadata(&self, event: &mut E, key: &str, value: Value) {
        if let Ok(codec) = self.codec_for(event.event_type()) {
            codec.add_metadata(event, key, value);
        }
    }
}
