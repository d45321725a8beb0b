//! Operators that derive new topics from existing ones.
//!
//! Each operator subscribes to the source topic and publishes into a fresh
//! derived topic. The subscription holds only a weak reference to the derived
//! topic, so dropping every handle to it detaches the operator from the
//! source.

use std::collections::VecDeque;
use std::sync::Arc;

use super::Topic;

/// Subscribe `apply` on `source`, feeding the derived topic for as long as it
/// is alive.
fn forward<T, V, F>(source: &Topic<T>, derived: &Topic<V>, mut apply: F)
where
    T: Clone + Send + 'static,
    V: Clone + Send + 'static,
    F: FnMut(&Topic<V>, &T) + Send + 'static,
{
    let weak = Arc::downgrade(derived.inner());
    source.subscribe(move |value: &T| match weak.upgrade() {
        Some(inner) => {
            apply(&Topic::from_inner(inner), value);
            true
        }
        None => false,
    });
}

impl<T: Clone + Send + 'static> Topic<T> {
    /// A topic of `f` applied to every value published here.
    pub fn map<V, F>(&self, f: F) -> Topic<V>
    where
        V: Clone + Send + 'static,
        F: Fn(&T) -> V + Send + 'static,
    {
        let derived = Topic::new();
        derived.set_initial(self.value().map(|v| f(&v)));
        forward(self, &derived, move |out, value| out.publish(f(value)));
        derived
    }

    /// A topic that republishes every value, calling `f` on each one first.
    pub fn tap<F>(&self, f: F) -> Topic<T>
    where
        F: Fn(&T) + Send + 'static,
    {
        let derived = Topic::new();
        derived.set_initial(self.value());
        forward(self, &derived, move |out, value| {
            f(value);
            out.publish(value.clone());
        });
        derived
    }

    /// A topic of the values for which `predicate` returns `true`.
    pub fn filter<F>(&self, predicate: F) -> Topic<T>
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        let derived = Topic::new();
        derived.set_initial(self.value().filter(|v| predicate(v)));
        forward(self, &derived, move |out, value| {
            if predicate(value) {
                out.publish(value.clone());
            }
        });
        derived
    }

    /// A topic of rolling windows over the source values.
    ///
    /// Windows are published once at least `min` values have arrived and are
    /// capped at the most recent `max` values. The source's current value, if
    /// any, seeds the window.
    pub fn collect(&self, min: usize, max: usize) -> Topic<Vec<T>> {
        assert!(min >= 1, "window must hold at least one value");
        assert!(max >= min, "window cap must be at least the minimum size");

        let derived = Topic::new();
        let mut window: VecDeque<T> = self.value().into_iter().collect();
        derived.set_initial((window.len() >= min).then(|| window.iter().cloned().collect()));
        forward(self, &derived, move |out, value| {
            window.push_back(value.clone());
            if window.len() > max {
                window.pop_front();
            }
            if window.len() >= min {
                out.publish(window.iter().cloned().collect());
            }
        });
        derived
    }

    /// A topic that delivers the most recent value to every new subscriber in
    /// addition to forwarding new ones.
    pub fn replay(&self) -> Topic<T> {
        let derived = Topic::replaying();
        derived.set_initial(self.value());
        forward(self, &derived, move |out, value| out.publish(value.clone()));
        derived
    }
}

impl<T: Clone + PartialEq + Send + 'static> Topic<T> {
    /// A topic that suppresses consecutive duplicate values.
    pub fn distinct(&self) -> Topic<T> {
        let derived = Topic::new();
        derived.set_initial(self.value());
        forward(self, &derived, move |out, value| {
            if out.value().as_ref() != Some(value) {
                out.publish(value.clone());
            }
        });
        derived
    }
}
