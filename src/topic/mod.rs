//! A reactive publish/subscribe primitive.
//!
//! A [`Topic`] holds the latest published value and pushes new values to
//! subscribers. Subscribers are callbacks that return `true` to stay
//! subscribed; returning `false` removes the subscription. Derived topics
//! built with operators such as [`Topic::map`] and [`Topic::filter`] forward
//! transformed values and detach automatically once dropped.

mod ops;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

/// Identifier handed out by [`Topic::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Box<dyn FnMut(&T) -> bool + Send>;
type Entry<T> = (SubscriptionId, Arc<Mutex<Callback<T>>>);

/// A topic callers publish to and subscribe on. Handles are cheap to clone
/// and share subscribers and the current value.
pub struct Topic<T> {
    inner: Arc<TopicInner<T>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct TopicInner<T> {
    subscribers: Mutex<Vec<Entry<T>>>,
    value: Mutex<Option<T>>,
    next_id: AtomicU64,
    /// New subscribers immediately receive the current value.
    replay: bool,
    lifecycle: Option<Lifecycle>,
}

struct Lifecycle {
    on_start: Box<dyn Fn() + Send + Sync>,
    on_stop: Box<dyn Fn() + Send + Sync>,
}

impl<T: Clone + Send + 'static> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Topic<T> {
    pub fn new() -> Self {
        Self::with_parts(false, None)
    }

    /// A topic that calls `on_start` when the first subscriber attaches and
    /// `on_stop` when the last one detaches. Useful for wrapping listener
    /// registration (e.g. a sensor) that should only be active while someone
    /// is watching.
    pub fn lazy(
        on_start: impl Fn() + Send + Sync + 'static,
        on_stop: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::with_parts(
            false,
            Some(Lifecycle {
                on_start: Box::new(on_start),
                on_stop: Box::new(on_stop),
            }),
        )
    }

    pub(crate) fn replaying() -> Self {
        Self::with_parts(true, None)
    }

    fn with_parts(replay: bool, lifecycle: Option<Lifecycle>) -> Self {
        Self {
            inner: Arc::new(TopicInner {
                subscribers: Mutex::new(Vec::new()),
                value: Mutex::new(None),
                next_id: AtomicU64::new(0),
                replay,
                lifecycle,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<TopicInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<TopicInner<T>> {
        &self.inner
    }

    /// The latest published value, if any.
    pub fn value(&self) -> Option<T> {
        self.inner.lock_value().clone()
    }

    pub(crate) fn set_initial(&self, value: Option<T>) {
        *self.inner.lock_value() = value;
    }

    /// Publish a value to all current subscribers.
    ///
    /// Subscribers run outside the topic's locks, so they may subscribe or
    /// publish to other topics freely. Publishing back into the same topic
    /// from one of its own subscribers is not supported.
    pub fn publish(&self, value: T) {
        *self.inner.lock_value() = Some(value.clone());

        let snapshot: Vec<Entry<T>> = self
            .inner
            .lock_subscribers()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        let mut dropped = Vec::new();
        for (id, callback) in snapshot {
            let keep = {
                let mut callback = callback.lock().expect("subscriber lock poisoned");
                (*callback)(&value)
            };
            if !keep {
                dropped.push(id);
            }
        }
        for id in dropped {
            self.unsubscribe(id);
        }
    }

    /// Register a subscriber. It is invoked for every published value;
    /// returning `false` removes the subscription.
    pub fn subscribe(
        &self,
        mut subscriber: impl FnMut(&T) -> bool + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        if self.inner.replay {
            if let Some(current) = self.value() {
                if !subscriber(&current) {
                    // consumed a single value, never attached
                    return id;
                }
            }
        }

        let became_first = {
            let mut subscribers = self.inner.lock_subscribers();
            subscribers.push((id, Arc::new(Mutex::new(Box::new(subscriber) as Callback<T>))));
            subscribers.len() == 1
        };
        if became_first {
            if let Some(lifecycle) = &self.inner.lifecycle {
                (lifecycle.on_start)();
            }
        }
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let became_empty = {
            let mut subscribers = self.inner.lock_subscribers();
            let before = subscribers.len();
            subscribers.retain(|(sid, _)| *sid != id);
            before != subscribers.len() && subscribers.is_empty()
        };
        if became_empty {
            if let Some(lifecycle) = &self.inner.lifecycle {
                (lifecycle.on_stop)();
            }
        }
    }

    /// Remove every subscription.
    pub fn unsubscribe_all(&self) {
        let had_subscribers = {
            let mut subscribers = self.inner.lock_subscribers();
            let had = !subscribers.is_empty();
            subscribers.clear();
            had
        };
        if had_subscribers {
            if let Some(lifecycle) = &self.inner.lifecycle {
                (lifecycle.on_stop)();
            }
        }
    }

    /// Wait for the next published value (or the current one, on a replaying
    /// topic).
    pub async fn read(&self) -> T {
        loop {
            let (tx, rx) = oneshot::channel();
            let mut tx = Some(tx);
            self.subscribe(move |value: &T| {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(value.clone());
                }
                false
            });
            match rx.await {
                Ok(value) => return value,
                // the subscription was dropped by unsubscribe_all; wait for
                // the next value on a fresh one
                Err(_) => continue,
            }
        }
    }
}

impl<T> TopicInner<T> {
    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Entry<T>>> {
        self.subscribers.lock().expect("topic lock poisoned")
    }

    fn lock_value(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().expect("topic lock poisoned")
    }
}
