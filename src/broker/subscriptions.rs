use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::broker::Subscriber;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Returns a process-wide unique identifier, used for registrations and scopes.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

struct Entry<E> {
    id: u64,
    subscriber: Subscriber<E>,
}

impl<E> Clone for Entry<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            subscriber: self.subscriber.clone(),
        }
    }
}

/// A set of [Subscriber]s, partitioned between the ones interested in
/// specific event types and the ones receiving every event.
///
/// Insertion order is preserved in both partitions.
pub struct Subscriptions<E> {
    by_type: HashMap<String, Vec<Entry<E>>>,
    global: Vec<Entry<E>>,
}

impl<E> Default for Subscriptions<E> {
    fn default() -> Self {
        Self {
            by_type: HashMap::default(),
            global: Vec::default(),
        }
    }
}

impl<E> Clone for Subscriptions<E> {
    fn clone(&self) -> Self {
        Self {
            by_type: self.by_type.clone(),
            global: self.global.clone(),
        }
    }
}

impl<E> Debug for Subscriptions<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let by_type: HashMap<_, _> = self
            .by_type
            .iter()
            .map(|(event_type, entries)| (event_type, entries.len()))
            .collect();

        f.debug_struct("Subscriptions")
            .field("by_type", &by_type)
            .field("global", &self.global.len())
            .finish()
    }
}

impl<E> Subscriptions<E> {
    /// Registers the subscriber under each of the specified event types,
    /// returning the identifiers of the new registrations.
    pub fn add(&mut self, subscriber: Subscriber<E>, event_types: &[&str]) -> Vec<u64> {
        event_types
            .iter()
            .map(|event_type| {
                let id = next_id();

                self.by_type
                    .entry((*event_type).to_owned())
                    .or_default()
                    .push(Entry {
                        id,
                        subscriber: subscriber.clone(),
                    });

                id
            })
            .collect()
    }

    /// Registers the subscriber for all events, returning the identifier
    /// of the new registration.
    pub fn add_global(&mut self, subscriber: Subscriber<E>) -> u64 {
        let id = next_id();
        self.global.push(Entry { id, subscriber });
        id
    }

    pub(crate) fn remove(&mut self, ids: &[u64]) {
        for entries in self.by_type.values_mut() {
            entries.retain(|entry| !ids.contains(&entry.id));
        }

        self.by_type.retain(|_, entries| !entries.is_empty());
        self.global.retain(|entry| !ids.contains(&entry.id));
    }

    /// Returns `true` if no subscriber is registered at all.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty() && self.global.is_empty()
    }

    /// Returns the subscribers an event of the specified type is dispatched to:
    /// the type-specific ones first, then the ones receiving every event.
    pub fn matching<'a>(&'a self, event_type: &str) -> impl Iterator<Item = &'a Subscriber<E>> + 'a {
        self.by_type
            .get(event_type)
            .into_iter()
            .flatten()
            .chain(self.global.iter())
            .map(|entry| &entry.subscriber)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::Event;

    fn subscriber() -> Subscriber<Event> {
        Subscriber::from_fn(|_| Ok(()))
    }

    #[test]
    fn matching_lists_type_specific_subscribers_before_global_ones() {
        let mut subscriptions = Subscriptions::default();

        subscriptions.add_global(subscriber());
        subscriptions.add(subscriber(), &["OrderCreated", "ProductAdded"]);
        subscriptions.add(subscriber(), &["OrderCreated"]);

        assert_eq!(3, subscriptions.matching("OrderCreated").count());
        assert_eq!(2, subscriptions.matching("ProductAdded").count());
        assert_eq!(1, subscriptions.matching("Unknown").count());
    }

    #[test]
    fn remove_drops_every_registration_with_the_given_ids() {
        let mut subscriptions = Subscriptions::default();

        let ids = subscriptions.add(subscriber(), &["OrderCreated", "ProductAdded"]);
        let global = subscriptions.add_global(subscriber());
        let kept = subscriptions.add(subscriber(), &["OrderCreated"]);

        subscriptions.remove(&ids);
        assert_eq!(2, subscriptions.matching("OrderCreated").count());
        assert_eq!(1, subscriptions.matching("ProductAdded").count());

        subscriptions.remove(&[global]);
        subscriptions.remove(&kept);
        assert!(subscriptions.is_empty());
    }
}
