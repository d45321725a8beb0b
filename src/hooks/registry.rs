//! A caller-owned registry of keyed effects and memos.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use crate::change::{hash_of, ChangeDetector, HashChangeDetector};

/// Keyed effects and memos with an explicit owner and lifecycle.
///
/// Each call site picks a key that is stable across invocations; the registry
/// tracks one change detector (for effects) or one cached value (for memos)
/// per key. The registry is an ordinary value: create one per component and
/// drop or reset it with that component, rather than sharing process-wide
/// state.
#[derive(Default)]
pub struct Hooks {
    effects: Mutex<HashMap<String, HashChangeDetector>>,
    memos: Mutex<HashMap<String, MemoSlot>>,
}

struct MemoSlot {
    digest: u64,
    value: Box<dyn Any + Send>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` only if the dependencies for `key` changed since the last
    /// call with that key. The first call for a key always runs.
    pub fn effect<D: Hash + ?Sized>(&self, key: &str, deps: &D, action: impl FnOnce()) {
        let changed = {
            let mut effects = lock(&self.effects);
            effects
                .entry(key.to_owned())
                .or_default()
                .has_changed(deps)
        };
        // user code runs without the registry lock held
        if changed {
            action();
        }
    }

    /// Return the memoized value for `key`, recomputing it when the
    /// dependencies change.
    pub fn memo<T, D>(&self, key: &str, deps: &D, value: impl FnOnce() -> T) -> T
    where
        T: Clone + Send + 'static,
        D: Hash + ?Sized,
    {
        let digest = hash_of(deps);
        {
            let memos = lock(&self.memos);
            if let Some(slot) = memos.get(key) {
                if slot.digest == digest {
                    if let Some(cached) = slot.value.downcast_ref::<T>() {
                        return cached.clone();
                    }
                }
            }
        }

        let value = value();
        let mut memos = lock(&self.memos);
        memos.insert(
            key.to_owned(),
            MemoSlot {
                digest,
                value: Box::new(value.clone()),
            },
        );
        value
    }

    /// Reset effects. `keys = None` resets all of them; `except` is always
    /// kept.
    pub fn reset_effects(&self, keys: Option<&[&str]>, except: &[&str]) {
        reset_keys(&mut lock(&self.effects), keys, except);
    }

    /// Reset memos. `keys = None` resets all of them; `except` is always kept.
    pub fn reset_memos(&self, keys: Option<&[&str]>, except: &[&str]) {
        reset_keys(&mut lock(&self.memos), keys, except);
    }
}

fn reset_keys<V>(map: &mut HashMap<String, V>, keys: Option<&[&str]>, except: &[&str]) {
    map.retain(|key, _| {
        let key = key.as_str();
        if except.contains(&key) {
            return true;
        }
        match keys {
            None => false,
            Some(keys) => !keys.contains(&key),
        }
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("hooks lock poisoned")
}
