//! Invocation counter with a per-thread reentrancy guard
//!
//! The count is a plain atomic so concurrent callers never lose updates.
//! The guard is tracked per executing thread and per counter: while a thread
//! holds it, further increments on that thread are skipped instead of
//! counted. This keeps anything that runs inside the counting step (for
//! example a tracing subscriber reacting to the count event) from recursing
//! back into an instrumented member and inflating the total.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use fnv::FnvHashSet;

thread_local! {
    static HELD_GUARDS: RefCell<FnvHashSet<u64>> = RefCell::new(FnvHashSet::default());
}

/// Invocation counter owned by one engine
#[derive(Debug)]
pub struct CounterState {
    id: u64,
    count: AtomicU64,
}

impl Default for CounterState {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterState {
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            count: AtomicU64::new(0),
        }
    }

    /// Total invocations counted so far
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Whether the current thread holds this counter's guard
    pub fn is_guarded(&self) -> bool {
        HELD_GUARDS.with(|held| held.borrow().contains(&self.id))
    }

    /// Acquire the guard for the current thread, or `None` if this thread
    /// already holds it. The guard is released when dropped.
    pub fn guard(&self) -> Option<CountGuard<'_>> {
        let acquired = HELD_GUARDS.with(|held| held.borrow_mut().insert(self.id));
        acquired.then_some(CountGuard { counter: self })
    }

    /// Count one invocation. Returns false (and counts nothing) when called
    /// re-entrantly from inside the counting step on this thread.
    pub fn increment(&self) -> bool {
        let Some(_guard) = self.guard() else {
            return false;
        };
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(count, "invocation counted");
        true
    }
}

/// Scoped reentrancy guard for a [`CounterState`]
#[derive(Debug)]
pub struct CountGuard<'a> {
    counter: &'a CounterState,
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        HELD_GUARDS.with(|held| {
            held.borrow_mut().remove(&self.counter.id);
        });
    }
}
