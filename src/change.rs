//! Dependency change detection.
//!
//! Detectors answer one question: did this value change since the last time I
//! looked? The first observation always reports a change.

use std::hash::{DefaultHasher, Hash, Hasher};

/// Detects whether a value changed since the last observation.
pub trait ChangeDetector<T: ?Sized> {
    /// Record the value and report whether it differs from the previous one.
    fn has_changed(&mut self, value: &T) -> bool;

    /// Forget the previous observation; the next call reports a change.
    fn reset(&mut self);
}

/// Change detection by hash digest.
///
/// Stores only a 64-bit digest, so it works for any `Hash` dependency tuple
/// without retaining the values. Distinct values that collide hash-wise are
/// (rarely, and acceptably) treated as unchanged.
#[derive(Debug, Default)]
pub struct HashChangeDetector {
    cached: Option<u64>,
}

impl HashChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous observation; the next call reports a change.
    ///
    /// Inherent rather than only on [`ChangeDetector`], where the generic
    /// value parameter cannot be inferred from a bare `reset` call.
    pub fn reset(&mut self) {
        self.cached = None;
    }
}

impl<T: Hash + ?Sized> ChangeDetector<T> for HashChangeDetector {
    fn has_changed(&mut self, value: &T) -> bool {
        let digest = hash_of(value);
        let changed = self.cached != Some(digest);
        self.cached = Some(digest);
        changed
    }

    fn reset(&mut self) {
        self.cached = None;
    }
}

/// Change detection by retained value comparison.
#[derive(Debug)]
pub struct EqualityChangeDetector<T> {
    cached: Option<T>,
}

impl<T> Default for EqualityChangeDetector<T> {
    fn default() -> Self {
        Self { cached: None }
    }
}

impl<T> EqualityChangeDetector<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: PartialEq + Clone> ChangeDetector<T> for EqualityChangeDetector<T> {
    fn has_changed(&mut self, value: &T) -> bool {
        let changed = self.cached.as_ref() != Some(value);
        if changed {
            self.cached = Some(value.clone());
        }
        changed
    }

    fn reset(&mut self) {
        self.cached = None;
    }
}

/// Combined digest of a dependency value or tuple.
pub fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
