#![allow(dead_code)]

use std::sync::Arc;

use eventually_store::broker::{Handler, Subscriber};
use eventually_store::event::{Data, Event};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde_json::{json, Value};

lazy_static! {
    pub static ref ORDER_DATA: Data = data(json!({
        "order_id": 42,
        "customer": { "id": 7, "vip": true },
        "lines": [
            { "sku": "A-1", "quantity": 2 },
            { "sku": "B-7", "quantity": 1 },
        ],
    }));
}

pub fn data(value: Value) -> Data {
    match value {
        Value::Object(fields) => fields,
        _ => Data::default(),
    }
}

pub fn order_created() -> Event {
    Event::new("OrderCreated", ORDER_DATA.clone())
}

pub fn product_added() -> Event {
    Event::new("ProductAdded", data(json!({ "sku": "B-7" })))
}

/// Handler keeping track of every event it receives.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Handler<Event> for Recorder {
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

impl Recorder {
    pub fn subscriber(&self) -> Subscriber<Event> {
        Subscriber::instance(self.clone())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn event_ids(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.event_id.clone())
            .collect()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.event_type.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}
