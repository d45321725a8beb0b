//! An action that runs only when its dependencies change.

use std::hash::Hash;

use crate::change::{ChangeDetector, HashChangeDetector};

/// Runs an action when the observed dependencies differ from the last run
/// (similar to the effect hook in React).
#[derive(Debug, Default)]
pub struct Effect {
    detector: HashChangeDetector,
}

impl Effect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` only if `deps` changed since the last invocation. The
    /// first invocation always runs.
    pub fn run_if_changed<D: Hash + ?Sized>(&mut self, deps: &D, action: impl FnOnce()) {
        if self.detector.has_changed(deps) {
            action();
        }
    }

    /// Forget the last observation; the next invocation runs unconditionally.
    pub fn reset(&mut self) {
        self.detector.reset();
    }
}
