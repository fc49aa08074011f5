use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use envconfig::Envconfig;
use eventually_store::broker::Subscriber;
use eventually_store::client::{Client, ClientBuilder};
use eventually_store::clock::FixedClock;
use eventually_store::codec::{JsonCodec, Registry, SerializedRecord, TypedCodec};
use eventually_store::config::Config;
use eventually_store::event::{DomainEvent, Event, Metadata};
use eventually_store::repository::{InMemory, Repository, Start};
use eventually_store::tracing::RepositoryExt;
use eventually_store::version::ExpectedVersion;
use serde::{Deserialize, Serialize};
use serde_json::json;

mod setup;

use setup::Recorder;

fn fixed_clock() -> FixedClock {
    FixedClock(
        Utc.with_ymd_and_hms(2021, 3, 14, 15, 9, 26)
            .single()
            .expect("valid date"),
    )
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|event| event.event_id.as_str()).collect()
}

#[test]
fn published_events_are_timestamped_with_the_injected_clock() {
    let clock = fixed_clock();
    let client = Client::builder(InMemory::default()).clock(clock).build();
    let recorder = Recorder::default();

    client
        .subscribe_to_all_events(recorder.subscriber())
        .expect("subscribe");

    let event = setup::order_created();
    client
        .publish(event.clone(), "orders", ExpectedVersion::NoStream)
        .expect("publish");

    let expected = json!(clock.0.to_rfc3339());

    let received = recorder.events();
    assert_eq!(Some(&expected), received[0].metadata.get("timestamp"));

    let stored = client.read_event(&event.event_id).expect("read_event");
    assert_eq!(event, stored);
    assert_eq!(Some(&expected), stored.metadata.get("timestamp"));
}

#[test]
fn caller_supplied_metadata_is_not_overwritten() {
    let client = Client::builder(InMemory::default())
        .clock(fixed_clock())
        .metadata_provider(|| {
            let mut metadata = Metadata::new();
            metadata.insert("request_id".to_owned(), json!("from-provider"));
            metadata.insert("tenant".to_owned(), json!("acme"));
            metadata
        })
        .build();

    let event = setup::order_created()
        .with_metadata("timestamp", "2000-01-01T00:00:00Z")
        .with_metadata("request_id", "from-caller");

    client
        .publish(event.clone(), "orders", ExpectedVersion::Any)
        .expect("publish");

    let stored = client.read_event(&event.event_id).expect("read_event");

    assert_eq!(Some(&json!("2000-01-01T00:00:00Z")), stored.metadata.get("timestamp"));
    assert_eq!(Some(&json!("from-caller")), stored.metadata.get("request_id"));
    assert_eq!(Some(&json!("acme")), stored.metadata.get("tenant"));
}

#[test]
fn nested_data_survives_the_round_trip() {
    let client = Client::builder(InMemory::default()).build();
    let event = setup::order_created();

    client
        .publish(event.clone(), "orders", ExpectedVersion::Any)
        .expect("publish");

    let stored = client.read_event(&event.event_id).expect("read_event");

    assert_eq!(event.event_id, stored.event_id);
    assert_eq!(event.event_type, stored.event_type);
    assert_eq!(*setup::ORDER_DATA, stored.data);
}

#[test]
fn batches_are_appended_at_once_and_dispatched_in_order() {
    let client = Client::builder(InMemory::default()).build();
    let recorder = Recorder::default();

    client
        .subscribe_to_all_events(recorder.subscriber())
        .expect("subscribe");

    let batch = vec![setup::order_created(), setup::product_added()];
    client
        .publish_batch(batch.clone(), "orders", ExpectedVersion::NoStream)
        .expect("publish batch");

    assert_eq!(batch, recorder.events());

    let err = client
        .publish_batch(
            vec![setup::order_created(), setup::order_created()],
            "orders",
            ExpectedVersion::NoStream,
        )
        .expect_err("stream exists already");

    assert!(err.conflict().is_some());
    assert_eq!(2, recorder.len());
    assert_eq!(
        ids(&batch),
        ids(&client.read_stream_events_forward("orders").expect("read"))
    );
}

#[test]
fn appending_does_not_dispatch() {
    let client = Client::builder(InMemory::default()).build();
    let recorder = Recorder::default();

    client
        .subscribe_to_all_events(recorder.subscriber())
        .expect("subscribe");

    let event = setup::order_created();
    client
        .append_to_stream(vec![event.clone()], "orders", ExpectedVersion::NoStream)
        .expect("append");

    assert_eq!(0, recorder.len());
    assert_eq!(
        Some(event),
        client.last_stream_event("orders").expect("last_stream_event")
    );
}

#[test]
fn specifications_page_through_streams() {
    let env: HashMap<String, String> =
        [("EVENT_STORE_PAGE_SIZE".to_owned(), "2".to_owned())].into_iter().collect();
    let config = Config::init_from_hashmap(&env).expect("config");

    let client = Client::builder(InMemory::default()).config(config).build();

    let events: Vec<Event> = (0..5).map(|_| setup::order_created()).collect();
    client
        .publish_batch(events.clone(), "orders", ExpectedVersion::NoStream)
        .expect("publish batch");
    client
        .publish(setup::product_added(), "products", ExpectedVersion::NoStream)
        .expect("publish");

    let forward = client.read().stream("orders").to_vec().expect("forward");
    assert_eq!(events, forward);

    let mut backward = client
        .read()
        .stream("orders")
        .backward()
        .to_vec()
        .expect("backward");
    backward.reverse();
    assert_eq!(events, backward);

    let window = client
        .read()
        .stream("orders")
        .from(1)
        .limit(2)
        .to_vec()
        .expect("window");
    assert_eq!(events[2..4].to_vec(), window);

    let all = client.read().all_streams().each().count();
    assert_eq!(6, all);

    let batches: Vec<usize> = client
        .read()
        .stream("orders")
        .in_batches(3)
        .map(|batch| batch.expect("batch").len())
        .collect();
    assert_eq!(vec![3, 2], batches);
}

#[test]
fn pass_through_operations_reach_the_repository() {
    let client = Client::builder(InMemory::default().with_tracing()).build();

    let events = vec![setup::order_created(), setup::order_created()];
    client
        .publish_batch(events.clone(), "orders", ExpectedVersion::NoStream)
        .expect("publish batch");

    let ids_to_link: Vec<&str> = ids(&events);
    client
        .link_to_stream(&ids_to_link, "archive", ExpectedVersion::NoStream)
        .expect("link");

    assert_eq!(
        vec!["all", "orders", "archive"],
        client.get_all_streams().expect("get_all_streams")
    );

    assert_eq!(
        events[1..].to_vec(),
        client
            .read_events_forward("archive", Start::Position(0), 10)
            .expect("read forward")
    );
    assert_eq!(
        events[..1].to_vec(),
        client
            .read_events_backward("archive", Start::Position(1), 10)
            .expect("read backward")
    );
    assert_eq!(
        2,
        client
            .read_all_streams_backward(Start::Head, 10)
            .expect("read all backward")
            .len()
    );

    client.delete_stream("orders").expect("delete");
    assert!(client
        .read_stream_events_backward("orders")
        .expect("read deleted")
        .is_empty());
    assert!(client.has_event(&events[0].event_id).expect("has_event"));
    assert_eq!(
        events,
        client
            .read_all_streams_forward(Start::Head, 10)
            .expect("read all forward")
    );
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderPlaced {
    event_id: String,
    order_id: u64,
    timestamp: Option<String>,
}

impl DomainEvent for OrderPlaced {
    fn event_id(&self) -> &str {
        &self.event_id
    }

    fn event_type(&self) -> &str {
        "OrderPlaced"
    }
}

#[test]
fn typed_events_are_enriched_through_their_fields() {
    let clock = fixed_clock();
    let client = ClientBuilder::new(InMemory::default(), TypedCodec::<OrderPlaced>::default())
        .clock(clock)
        .build();

    let received = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let handler_received = std::sync::Arc::clone(&received);
    client
        .subscribe(
            Subscriber::from_fn(move |event: &OrderPlaced| {
                handler_received.lock().push(event.clone());
                Ok(())
            }),
            &["OrderPlaced"],
        )
        .expect("subscribe");

    let event = OrderPlaced {
        event_id: "order-placed-1".to_owned(),
        order_id: 1,
        timestamp: None,
    };

    client
        .publish(event.clone(), "orders", ExpectedVersion::NoStream)
        .expect("publish");

    let expected = OrderPlaced {
        timestamp: Some(clock.0.to_rfc3339()),
        ..event
    };

    assert_eq!(vec![expected.clone()], *received.lock());
    assert_eq!(
        expected,
        client.read_event("order-placed-1").expect("read_event")
    );
}

#[test]
fn registry_decodes_renamed_event_types() {
    let repository = InMemory::default();
    repository
        .append_to_stream(
            vec![SerializedRecord {
                event_id: "legacy-1".to_owned(),
                event_type: "Legacy::OrderPlaced".to_owned(),
                data: br#"{"order_id":42}"#.to_vec(),
                metadata: br#"{"timestamp":"2010-01-01T00:00:00Z"}"#.to_vec(),
            }],
            "orders",
            ExpectedVersion::NoStream,
        )
        .expect("append legacy record");

    let registry = Registry::<Event>::default()
        .register("OrderCreated", JsonCodec::default())
        .register("ProductAdded", JsonCodec::default())
        .alias("Legacy::OrderPlaced", "OrderCreated");

    let client = ClientBuilder::new(repository, registry).build();

    let event = client.read_event("legacy-1").expect("read_event");
    assert_eq!("OrderCreated", event.event_type);
    assert_eq!(Some(&json!(42)), event.data.get("order_id"));

    client
        .publish(setup::product_added(), "products", ExpectedVersion::NoStream)
        .expect("publish registered type");

    let err = client
        .publish(
            Event::new("Unregistered", Default::default()),
            "products",
            ExpectedVersion::Any,
        )
        .expect_err("unregistered types cannot be encoded");
    assert!(matches!(err, eventually_store::Error::Codec(_)));
}
