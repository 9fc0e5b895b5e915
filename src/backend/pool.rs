use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

use crate::config::PoolSettings;

/// A pooled item and the moment it was opened.
pub struct Pooled<T> {
    pub item: T,
    opened: Instant,
}

impl<T> Pooled<T> {
    fn new(item: T) -> Self {
        Self {
            item,
            opened: Instant::now(),
        }
    }
}

struct SlotState<T> {
    idle: Vec<Pooled<T>>,
    open: usize,
}

/// Bounded set of reusable connections.
///
/// At most `max_open` items exist at once; further borrowers block until one is
/// checked in. Checked-in items are kept while fewer than `max_idle` are idle
/// and they have not outlived `max_lifetime`.
pub struct Slots<T> {
    settings: PoolSettings,
    state: Mutex<SlotState<T>>,
    available: Condvar,
}

impl<T> Slots<T> {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(SlotState {
                idle: Vec::new(),
                open: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Poisoning is ignored: a panic while dropping an expired item leaves the
    /// counters already settled.
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take an idle item, or open a new one with `open` once a slot is free.
    pub fn checkout<E>(&self, open: impl FnOnce() -> Result<T, E>) -> Result<Pooled<T>, E> {
        let mut state = self.lock();
        loop {
            while let Some(pooled) = state.idle.pop() {
                if !self.settings.is_expired(pooled.opened.elapsed()) {
                    return Ok(pooled);
                }
                state.open -= 1;
            }
            if state.open < self.settings.max_open {
                state.open += 1;
                break;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        drop(state);

        match open() {
            Ok(item) => Ok(Pooled::new(item)),
            Err(err) => {
                self.forget_one();
                Err(err)
            }
        }
    }

    /// Return an item. Broken items (`reusable == false`) give up their slot.
    pub fn checkin(&self, pooled: Pooled<T>, reusable: bool) {
        let mut state = self.lock();
        let keep = reusable
            && state.idle.len() < self.settings.max_idle
            && !self.settings.is_expired(pooled.opened.elapsed());
        let closed = if keep {
            state.idle.push(pooled);
            None
        } else {
            state.open -= 1;
            Some(pooled)
        };
        drop(state);
        self.available.notify_one();
        drop(closed);
    }

    fn forget_one(&self) {
        self.lock().open -= 1;
        self.available.notify_one();
    }

    /// Items currently counted against `max_open`, idle ones included.
    pub fn open_count(&self) -> usize {
        self.lock().open
    }

    pub fn idle_count(&self) -> usize {
        self.lock().idle.len()
    }
}
