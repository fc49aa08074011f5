//! Synchronous, in-process dispatch of published Domain Events to
//! subscribed [Handler]s.
//!
//! A [Broker] keeps its permanent [Subscriptions] in a copy-on-write
//! registry: every notification works on a snapshot of it, so no lock is
//! held while handlers run and (un)registrations take effect from the next
//! notification onwards.
//!
//! Temporary subscriptions can be activated for the duration of a block
//! through [Broker::with_scope]. Scopes are bound to the calling thread:
//! events published on other threads never reach them.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::event::DomainEvent;

mod scope;
mod subscriptions;

pub use subscriptions::Subscriptions;

/// All possible errors returned by a [Broker].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The subscriber cannot produce a working handler; raised at
    /// registration time, never at dispatch time.
    #[error("invalid event handler: {0}")]
    InvalidHandler(String),

    /// A handler failed while processing the event. Dispatch stops at the
    /// first failing handler.
    #[error("event handler failed: {0}")]
    Handler(#[source] anyhow::Error),
}

/// Capability of receiving published Domain Events.
///
/// Implemented for any `Fn(&E) -> anyhow::Result<()>` closure.
pub trait Handler<E>: Send + Sync {
    /// Handles the published event. Returning an error stops the dispatch
    /// and propagates the error to the publisher.
    fn handle(&self, event: &E) -> anyhow::Result<()>;
}

impl<E, F> Handler<E> for F
where
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &E) -> anyhow::Result<()> {
        self(event)
    }
}

type Factory<E> = dyn Fn() -> anyhow::Result<Box<dyn Handler<E>>> + Send + Sync;

/// Something a [Broker] can dispatch events to.
pub enum Subscriber<E> {
    /// A single handler instance, shared by every dispatch.
    Instance(Arc<dyn Handler<E>>),

    /// Builds a fresh handler for every dispatched event.
    Factory(Arc<Factory<E>>),
}

impl<E> Subscriber<E> {
    /// Wraps a shared handler instance.
    pub fn instance(handler: impl Handler<E> + 'static) -> Self {
        Self::Instance(Arc::new(handler))
    }

    /// Wraps a closure as a shared handler instance.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Instance(Arc::new(f))
    }

    /// Wraps a factory building a new handler for every dispatched event.
    pub fn factory<F, H>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<H> + Send + Sync + 'static,
        H: Handler<E> + 'static,
    {
        Self::Factory(Arc::new(move || {
            f().map(|handler| Box::new(handler) as Box<dyn Handler<E>>)
        }))
    }
}

impl<E> Clone for Subscriber<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Instance(handler) => Self::Instance(Arc::clone(handler)),
            Self::Factory(factory) => Self::Factory(Arc::clone(factory)),
        }
    }
}

impl<E> Debug for Subscriber<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Instance(_) => f.write_str("Subscriber::Instance"),
            Self::Factory(_) => f.write_str("Subscriber::Factory"),
        }
    }
}

/// Strategy used by a [Broker] to invoke its subscribers.
pub trait Dispatcher<E>: Send + Sync {
    /// Invokes the subscriber with the published event.
    ///
    /// # Errors
    ///
    /// Any error returned by the handler, or by the factory building it.
    fn call(&self, subscriber: &Subscriber<E>, event: &E) -> anyhow::Result<()>;

    /// Checks, at registration time, that the subscriber can be called.
    ///
    /// # Errors
    ///
    /// [Error::InvalidHandler] if the subscriber cannot be called.
    fn verify(&self, subscriber: &Subscriber<E>) -> Result<(), Error>;
}

/// [Dispatcher] calling the handlers synchronously, on the publisher thread.
///
/// Factories are verified by building one handler instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl<E> Dispatcher<E> for Direct {
    fn call(&self, subscriber: &Subscriber<E>, event: &E) -> anyhow::Result<()> {
        match subscriber {
            Subscriber::Instance(handler) => handler.handle(event),
            Subscriber::Factory(factory) => factory()?.handle(event),
        }
    }

    fn verify(&self, subscriber: &Subscriber<E>) -> Result<(), Error> {
        match subscriber {
            Subscriber::Instance(_) => Ok(()),
            Subscriber::Factory(factory) => factory()
                .map(|_| ())
                .map_err(|err| Error::InvalidHandler(format!("{:#}", err))),
        }
    }
}

type Registry<E> = RwLock<Arc<Subscriptions<E>>>;

/// Dispatches published Domain Events to the subscribers interested in them.
///
/// Cloning a [Broker] returns a handle to the same registry and scopes.
pub struct Broker<E> {
    id: u64,
    registry: Arc<Registry<E>>,
    dispatcher: Arc<dyn Dispatcher<E>>,
}

impl<E> Clone for Broker<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            registry: Arc::clone(&self.registry),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<E> Debug for Broker<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Broker")
            .field("id", &self.id)
            .field("subscriptions", &*self.registry.read())
            .finish()
    }
}

impl<E> Default for Broker<E>
where
    E: DomainEvent,
{
    fn default() -> Self {
        Self::new(Direct)
    }
}

impl<E> Broker<E>
where
    E: DomainEvent,
{
    /// Creates a new [Broker] invoking its subscribers through the
    /// specified [Dispatcher].
    pub fn new(dispatcher: impl Dispatcher<E> + 'static) -> Self {
        Self {
            id: subscriptions::next_id(),
            registry: Arc::default(),
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Checks that the subscriber can be called by this broker's [Dispatcher].
    ///
    /// # Errors
    ///
    /// [Error::InvalidHandler] if the subscriber cannot be called.
    pub fn verify(&self, subscriber: &Subscriber<E>) -> Result<(), Error> {
        self.dispatcher.verify(subscriber)
    }

    /// Registers the subscriber for events of the specified types.
    ///
    /// # Errors
    ///
    /// [Error::InvalidHandler] if the subscriber cannot be called;
    /// nothing is registered in that case.
    pub fn subscribe(
        &self,
        subscriber: Subscriber<E>,
        event_types: &[&str],
    ) -> Result<Unsubscribe<E>, Error> {
        self.verify(&subscriber)?;

        let ids = Arc::make_mut(&mut *self.registry.write()).add(subscriber, event_types);

        tracing::debug!(broker = self.id, ?event_types, "subscriber registered");

        Ok(self.unsubscribe_handle(ids))
    }

    /// Registers the subscriber for every event.
    ///
    /// # Errors
    ///
    /// [Error::InvalidHandler] if the subscriber cannot be called;
    /// nothing is registered in that case.
    pub fn subscribe_to_all_events(&self, subscriber: Subscriber<E>) -> Result<Unsubscribe<E>, Error> {
        self.verify(&subscriber)?;

        let id = Arc::make_mut(&mut *self.registry.write()).add_global(subscriber);

        tracing::debug!(broker = self.id, "subscriber registered to all events");

        Ok(self.unsubscribe_handle(vec![id]))
    }

    fn unsubscribe_handle(&self, ids: Vec<u64>) -> Unsubscribe<E> {
        Unsubscribe {
            registry: Arc::downgrade(&self.registry),
            ids,
            done: AtomicBool::new(false),
        }
    }

    /// Dispatches the event to the permanent subscribers and to the ones of
    /// every scope active on the current thread, innermost scope first.
    ///
    /// # Errors
    ///
    /// [Error::Handler] with the error of the first failing handler;
    /// subsequent handlers are not called.
    pub fn notify(&self, event: &E) -> Result<(), Error> {
        self.notify_all(std::slice::from_ref(event))
    }

    /// Dispatches the events in order, as [Broker::notify] does for one.
    ///
    /// Subscribers are resolved once, before the first event is dispatched:
    /// subscriptions changed by a handler only apply to later calls.
    ///
    /// # Errors
    ///
    /// [Error::Handler] with the error of the first failing handler; the
    /// remaining handlers and events are skipped.
    pub fn notify_all(&self, events: &[E]) -> Result<(), Error> {
        let permanent = Arc::clone(&*self.registry.read());
        let scopes = scope::active::<E>(self.id);

        for event in events {
            let event_type = event.event_type();

            let subscribers = permanent
                .matching(event_type)
                .chain(scopes.iter().flat_map(|scope| scope.matching(event_type)));

            for subscriber in subscribers {
                tracing::trace!(
                    broker = self.id,
                    event_id = event.event_id(),
                    event_type,
                    ?subscriber,
                    "dispatching event"
                );

                self.dispatcher
                    .call(subscriber, event)
                    .map_err(Error::Handler)?;
            }
        }

        Ok(())
    }

    /// Runs the block with the subscriptions active on the current thread,
    /// removing them once the block returns or unwinds.
    pub fn with_scope<F, R>(&self, subscriptions: Subscriptions<E>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = scope::enter(self.id, subscriptions);
        f()
    }
}

/// Removes the registrations made by a single `subscribe` call.
///
/// Calling [Unsubscribe::unsubscribe] more than once has no further effect,
/// and so has calling it after the [Broker] has been dropped.
pub struct Unsubscribe<E> {
    registry: Weak<Registry<E>>,
    ids: Vec<u64>,
    done: AtomicBool,
}

impl<E> Debug for Unsubscribe<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Unsubscribe")
            .field("ids", &self.ids)
            .field("done", &self.done.load(Ordering::Relaxed))
            .finish()
    }
}

impl<E> Unsubscribe<E> {
    /// Removes the registrations from the broker.
    pub fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(registry) = self.registry.upgrade() {
            Arc::make_mut(&mut *registry.write()).remove(&self.ids);
            tracing::debug!(ids = ?self.ids, "subscriber unregistered");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::event::{Data, Event};

    fn recorder(received: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Subscriber<Event> {
        let received = Arc::clone(received);
        Subscriber::from_fn(move |event: &Event| {
            received
                .lock()
                .push(format!("{}:{}", name, event.event_type));
            Ok(())
        })
    }

    #[test]
    fn dispatch_order_follows_registration_partitions() {
        let broker = Broker::<Event>::default();
        let received = Arc::new(Mutex::new(Vec::new()));

        broker
            .subscribe_to_all_events(recorder(&received, "global"))
            .expect("subscribe global");
        broker
            .subscribe(recorder(&received, "first"), &["OrderCreated"])
            .expect("subscribe first");
        broker
            .subscribe(recorder(&received, "second"), &["OrderCreated"])
            .expect("subscribe second");

        let mut scoped = Subscriptions::default();
        scoped.add_global(recorder(&received, "scoped"));

        broker.with_scope(scoped, || {
            broker
                .notify(&Event::new("OrderCreated", Data::default()))
                .expect("notify");
        });

        assert_eq!(
            vec![
                "first:OrderCreated",
                "second:OrderCreated",
                "global:OrderCreated",
                "scoped:OrderCreated",
            ],
            *received.lock()
        );
    }

    #[test]
    fn subscribers_are_resolved_once_per_notification() {
        let broker = Broker::<Event>::default();
        let received = Arc::new(Mutex::new(Vec::new()));
        let subscribed = Arc::new(AtomicBool::new(false));

        let late = recorder(&received, "late");
        let registrar = broker.clone();
        let flag = Arc::clone(&subscribed);

        broker
            .subscribe(
                Subscriber::from_fn(move |_: &Event| {
                    if !flag.swap(true, Ordering::SeqCst) {
                        registrar.subscribe_to_all_events(late.clone())?;
                    }
                    Ok(())
                }),
                &["OrderCreated"],
            )
            .expect("subscribe registrar");

        broker
            .notify_all(&[
                Event::new("OrderCreated", Data::default()),
                Event::new("OrderShipped", Data::default()),
            ])
            .expect("notify batch");

        assert!(subscribed.load(Ordering::SeqCst));
        assert!(received.lock().is_empty());

        broker
            .notify(&Event::new("OrderShipped", Data::default()))
            .expect("notify after the batch");

        assert_eq!(vec!["late:OrderShipped"], *received.lock());
    }

    #[test]
    fn failing_handler_stops_the_dispatch() {
        let broker = Broker::<Event>::default();
        let received = Arc::new(Mutex::new(Vec::new()));

        broker
            .subscribe(
                Subscriber::from_fn(|_| Err(anyhow::anyhow!("boom"))),
                &["OrderCreated"],
            )
            .expect("subscribe failing");
        broker
            .subscribe(recorder(&received, "after"), &["OrderCreated"])
            .expect("subscribe recorder");

        let err = broker
            .notify(&Event::new("OrderCreated", Data::default()))
            .expect_err("dispatch should fail");

        assert!(matches!(err, Error::Handler(ref source) if source.to_string() == "boom"));
        assert!(received.lock().is_empty());
    }

    #[test]
    fn factories_failing_at_registration_are_rejected() {
        let broker = Broker::<Event>::default();
        let subscriber = Subscriber::factory(|| -> anyhow::Result<fn(&Event) -> anyhow::Result<()>> {
            Err(anyhow::anyhow!("missing dependency"))
        });

        let err = broker
            .subscribe(subscriber, &["OrderCreated"])
            .expect_err("factory should be rejected");

        assert!(matches!(err, Error::InvalidHandler(ref msg) if msg == "missing dependency"));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let broker = Broker::<Event>::default();
        let received = Arc::new(Mutex::new(Vec::new()));

        let first = broker
            .subscribe(recorder(&received, "first"), &["OrderCreated", "ProductAdded"])
            .expect("subscribe first");
        broker
            .subscribe(recorder(&received, "second"), &["OrderCreated"])
            .expect("subscribe second");

        first.unsubscribe();
        first.unsubscribe();

        broker
            .notify(&Event::new("OrderCreated", Data::default()))
            .expect("notify");
        broker
            .notify(&Event::new("ProductAdded", Data::default()))
            .expect("notify");

        assert_eq!(vec!["second:OrderCreated"], *received.lock());
    }

    #[test]
    fn unsubscribe_after_the_broker_is_gone_does_nothing() {
        let broker = Broker::<Event>::default();
        let handle = broker
            .subscribe_to_all_events(Subscriber::from_fn(|_| Ok(())))
            .expect("subscribe");

        drop(broker);
        handle.unsubscribe();
    }
}
