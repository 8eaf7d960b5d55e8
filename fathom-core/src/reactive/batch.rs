//! Batching
//!
//! Writes propagate dirtiness immediately, but effects are deferred to the
//! end of the outermost batch so that several writes cause one effect run.
//!
//! # How Flushing Works
//!
//! Effects reached by a write are queued on a thread-local set. When the
//! outermost batch exits (or right away, if no batch is open) the queue is
//! drained in rounds: each round takes the whole queue and brings every
//! effect in it up to date. Writes made by those effects queue more work for
//! the next round. A flush never nests; a flush already running on this
//! thread picks up everything queued while it runs.

use std::cell::RefCell;

use indexmap::IndexSet;

use super::runtime::Runtime;
use crate::error::ReactiveError;
use crate::graph::NodeId;

#[derive(Default)]
struct BatchState {
    depth: usize,
    flushing: bool,
    pending: IndexSet<NodeId>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Guard for an open batch. Flushes when the outermost guard drops.
struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        BATCH.with(|state| state.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let outermost = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth -= 1;
            state.depth == 0
        });
        if outermost {
            flush();
        }
    }
}

/// Resets the flushing flag even if an effect panics.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        BATCH.with(|state| state.borrow_mut().flushing = false);
    }
}

/// Run `f` with effect execution deferred until the outermost batch exits.
///
/// Nested batches flatten into the outermost one. Derived values are never
/// deferred: reading a memo inside a batch sees the writes made so far.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use fathom_core::{batch, cell, effect};
///
/// let a = cell(1);
/// let b = cell(2);
/// let runs = Arc::new(AtomicUsize::new(0));
///
/// let fx = {
///     let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
///     effect(move || {
///         let _ = a.get() + b.get();
///         runs.fetch_add(1, Ordering::SeqCst);
///     })
/// };
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// fx.dispose();
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::enter();
    f()
}

/// Whether a batch is open on this thread.
pub fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

/// Queue effects and flush unless a batch is open.
pub(crate) fn schedule(effects: impl IntoIterator<Item = NodeId>) {
    let run_now = BATCH.with(|state| {
        let mut state = state.borrow_mut();
        state.pending.extend(effects);
        state.depth == 0 && !state.pending.is_empty()
    });
    if run_now {
        flush();
    }
}

/// Run queued effects until the queue is empty.
pub(crate) fn flush() {
    let already_flushing = BATCH.with(|state| {
        let mut state = state.borrow_mut();
        std::mem::replace(&mut state.flushing, true)
    });
    if already_flushing {
        return;
    }
    let _guard = FlushGuard;

    let limit = Runtime::config().max_flush_iterations;
    let mut rounds = 0;

    loop {
        let pending = BATCH.with(|state| std::mem::take(&mut state.borrow_mut().pending));
        if pending.is_empty() {
            break;
        }

        rounds += 1;
        if rounds > limit {
            let error = ReactiveError::FlushLimit(limit);
            tracing::error!(%error, dropped = pending.len(), "aborting effect flush");
            break;
        }

        for id in pending {
            let Some(effect) = Runtime::lookup(id) else {
                continue;
            };
            if let Err(error) = effect.update() {
                tracing::error!(node = %id, %error, "effect update failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_batches_flatten() {
        assert!(!is_batching());
        batch(|| {
            assert!(is_batching());
            batch(|| assert!(is_batching()));
            assert!(is_batching());
        });
        assert!(!is_batching());
    }

    #[test]
    fn batch_returns_the_closure_result() {
        assert_eq!(batch(|| 6 * 7), 42);
    }

    #[test]
    fn unknown_effects_are_skipped() {
        schedule([NodeId::new()]);
        BATCH.with(|state| assert!(state.borrow().pending.is_empty()));
    }
}
