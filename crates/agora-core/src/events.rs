//! Explicit listener registry.
//!
//! Components that need to broadcast changes own a `Listeners<E>` and expose
//! `subscribe`/`unsubscribe`. Callbacks run synchronously in subscription
//! order on the thread that emits.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Registry<E> {
    next_id: u64,
    callbacks: BTreeMap<SubscriptionId, Callback<E>>,
}

pub struct Listeners<E> {
    inner: Mutex<Registry<E>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Registry {
                next_id: 0,
                callbacks: BTreeMap::new(),
            }),
        }
    }
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry<E>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.callbacks.insert(id, Arc::new(callback));
        id
    }

    /// Returns false if the id was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry().callbacks.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.registry().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback with `event`.
    ///
    /// The registry lock is released before callbacks run, so a callback may
    /// subscribe or unsubscribe without deadlocking.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self.registry().callbacks.values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_in_subscription_order() {
        let listeners: Listeners<u32> = Listeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            listeners.subscribe(move |n: &u32| seen.lock().unwrap().push(format!("{tag}:{n}")));
        }

        listeners.emit(&7);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:7", "second:7", "third:7"]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let listeners: Listeners<u32> = Listeners::new();
        let count = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&count);
        let id = listeners.subscribe(move |_| *counter.lock().unwrap() += 1);

        listeners.emit(&1);
        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        listeners.emit(&2);

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let listeners: Arc<Listeners<()>> = Arc::new(Listeners::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let registry = Arc::clone(&listeners);
        let own_id = Arc::clone(&slot);
        let id = listeners.subscribe(move |_| {
            if let Some(id) = *own_id.lock().unwrap() {
                registry.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        listeners.emit(&());
        assert!(listeners.is_empty());
    }
}
