//! A value recomputed only when its dependencies change.

use std::hash::Hash;

use crate::change::{ChangeDetector, HashChangeDetector};

/// Caches a computed value keyed by a dependency digest.
pub struct MemoizedValue<T> {
    detector: HashChangeDetector,
    cached: Option<T>,
}

impl<T: Clone> MemoizedValue<T> {
    pub fn new() -> Self {
        Self {
            detector: HashChangeDetector::new(),
            cached: None,
        }
    }

    /// Return the cached value, recomputing it if `deps` changed since the
    /// last call.
    pub fn get_or_put<D: Hash + ?Sized>(&mut self, deps: &D, value: impl FnOnce() -> T) -> T {
        let changed = self.detector.has_changed(deps);
        if !changed {
            if let Some(cached) = &self.cached {
                return cached.clone();
            }
        }
        let value = value();
        self.cached = Some(value.clone());
        value
    }

    /// Drop the cached value; the next `get_or_put` recomputes.
    pub fn reset(&mut self) {
        self.cached = None;
        self.detector.reset();
    }
}

impl<T: Clone> Default for MemoizedValue<T> {
    fn default() -> Self {
        Self::new()
    }
}
