//! Global safepoint bookkeeping.
//!
//! The replay phases of the evacuation-failure protocol must only run while
//! the world is stopped. This module tracks that state with a process-wide
//! depth counter: the collector holds a [`SafepointScope`] for the duration
//! of the pause, and debug builds assert the scope is held at the entry
//! points that require it. The counter nests, so independently coordinated
//! pauses (as in parallel tests) do not interfere.

use std::sync::atomic::{AtomicUsize, Ordering};

static SAFEPOINT_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// RAII marker for a stop-the-world pause.
///
/// The safepoint lasts from construction until the scope is dropped.
#[must_use = "the safepoint ends as soon as the scope is dropped"]
pub struct SafepointScope(());

impl SafepointScope {
    /// Enter a global safepoint.
    pub fn new() -> Self {
        SAFEPOINT_DEPTH.fetch_add(1, Ordering::SeqCst);
        Self(())
    }
}

impl Default for SafepointScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SafepointScope {
    fn drop(&mut self) {
        let prev = SAFEPOINT_DEPTH.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "unbalanced safepoint scope");
    }
}

/// Whether a [`SafepointScope`] is currently held anywhere in the process.
#[must_use]
pub fn is_at_safepoint() -> bool {
    SAFEPOINT_DEPTH.load(Ordering::SeqCst) > 0
}

/// Debug-build check for operations restricted to safepoints.
pub(crate) fn assert_at_safepoint() {
    debug_assert!(
        is_at_safepoint(),
        "operation requires a global safepoint"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_toggles_safepoint_state() {
        // Other tests may hold scopes concurrently, so only assert the
        // transitions this thread causes.
        let scope = SafepointScope::new();
        assert!(is_at_safepoint());
        drop(scope);
    }

    #[test]
    fn scopes_nest() {
        let outer = SafepointScope::new();
        {
            let _inner = SafepointScope::new();
            assert!(is_at_safepoint());
        }
        assert!(is_at_safepoint());
        drop(outer);
    }
}
