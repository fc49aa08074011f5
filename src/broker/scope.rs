//! Thread-local stack of temporary [Subscriptions], pushed and popped
//! around the execution of a block.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::broker::subscriptions::{next_id, Subscriptions};

struct Frame {
    broker: u64,
    id: u64,
    subscriptions: Rc<dyn Any>,
}

thread_local! {
    static SCOPES: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// Keeps a scope active on the current thread until dropped.
///
/// The guard cannot leave the thread that created it.
pub(crate) struct Guard {
    broker: u64,
    id: u64,
    _thread_bound: PhantomData<Rc<()>>,
}

impl Drop for Guard {
    fn drop(&mut self) {
        // The thread-local might be gone already if the guard is dropped
        // during thread teardown, in which case there is nothing to pop.
        let _ = SCOPES.try_with(|scopes| {
            scopes.borrow_mut().retain(|frame| frame.id != self.id);
        });

        tracing::debug!(broker = self.broker, scope = self.id, "subscription scope left");
    }
}

/// Pushes the subscriptions on the current thread's stack, on behalf of
/// the broker with the specified identity.
pub(crate) fn enter<E>(broker: u64, subscriptions: Subscriptions<E>) -> Guard
where
    E: 'static,
{
    let id = next_id();

    SCOPES.with(|scopes| {
        scopes.borrow_mut().push(Frame {
            broker,
            id,
            subscriptions: Rc::new(subscriptions),
        });
    });

    tracing::debug!(broker, scope = id, "subscription scope entered");

    Guard {
        broker,
        id,
        _thread_bound: PhantomData,
    }
}

/// Returns the subscriptions of the scopes active on the current thread
/// for the specified broker, from the innermost to the outermost.
pub(crate) fn active<E>(broker: u64) -> Vec<Rc<Subscriptions<E>>>
where
    E: 'static,
{
    SCOPES.with(|scopes| {
        scopes
            .borrow()
            .iter()
            .rev()
            .filter(|frame| frame.broker == broker)
            .filter_map(|frame| {
                Rc::clone(&frame.subscriptions)
                    .downcast::<Subscriptions<E>>()
                    .ok()
            })
            .collect()
    })
}
