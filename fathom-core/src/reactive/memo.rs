//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the memo is marked dirty (direct dependency)
//!    or maybe-dirty (something further upstream).
//!
//! 4. On next access, a maybe-dirty memo refreshes its upstream memos and
//!    re-checks whether any of their versions moved.
//!
//! 5. If inputs changed, recompute. Otherwise, mark clean and return cache.
//!
//! 6. A recompute that produces an equal value does not bump the memo's
//!    version, so everything downstream of it stays put.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! # Thread Safety
//!
//! Memos are thread-safe. The computation runs without any lock held, so it
//! may freely read other signals and memos.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::runtime::{NodeHandle, Reactive, Runtime};
use crate::error::ReactiveError;
use crate::graph::{DirtyState, NodeId, NodeKind};

struct MemoInner<T> {
    node: NodeHandle,

    /// The computation function.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value (None if never computed).
    value: RwLock<Option<T>>,
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn refresh(&self) -> Result<(), ReactiveError> {
        let id = self.node.id();
        if ReactiveContext::is_evaluating(id) {
            return Err(ReactiveError::Cycle(id));
        }

        let has_value = self.value.read().is_some();
        if has_value && !Runtime::needs_update(id)? {
            return Ok(());
        }

        self.recompute();
        Ok(())
    }

    /// Run the computation within a reactive context to collect its reads.
    fn recompute(&self) {
        let id = self.node.id();
        let ctx = ReactiveContext::enter(id);
        let new_value = (self.compute)();
        let dependencies = ctx.finish();

        let changed = {
            let mut slot = self.value.write();
            match slot.as_ref() {
                Some(current) if *current == new_value => false,
                _ => {
                    *slot = Some(new_value);
                    true
                }
            }
        };

        Runtime::commit_dependencies(id, dependencies);
        if changed {
            Runtime::bump_version(id);
        }
        tracing::trace!(node = %id, changed, "memo recomputed");
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.node.id()
    }

    fn update(&self) -> Result<(), ReactiveError> {
        self.refresh()
    }

    fn is_eager(&self) -> bool {
        false
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync + PartialEq.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (some memos might return the same value even if inputs changed).
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            node: NodeHandle::new(NodeKind::Derived),
            compute: Box::new(compute),
            value: RwLock::new(None),
        });
        let reactive: Arc<dyn Reactive> = inner.clone();
        Runtime::register(&reactive);
        Self { inner }
    }

    /// Get the memo's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.node.id()
    }

    /// Get the current value, recomputing if necessary, and track the read.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.inner.refresh()?;
        Runtime::track_read(self.id());
        self.cached()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value.
    ///
    /// # Panics
    ///
    /// Panics if the memo is read from its own computation, directly or
    /// through other memos. Use [`try_get`](Self::try_get) to get the
    /// [`ReactiveError::Cycle`] instead.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Get the current value, recomputing if necessary, without tracking.
    pub fn try_peek(&self) -> Result<T, ReactiveError> {
        self.inner.refresh()?;
        self.cached()
    }

    /// Untracked [`get`](Self::get).
    ///
    /// # Panics
    ///
    /// Same as [`get`](Self::get).
    pub fn peek(&self) -> T {
        match self.try_peek() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    fn cached(&self) -> Result<T, ReactiveError> {
        // A refresh that returned Ok always leaves a value behind.
        self.inner
            .value
            .read()
            .clone()
            .ok_or(ReactiveError::Cycle(self.id()))
    }

    /// Force a recompute on next access.
    ///
    /// Readers become maybe-dirty and effects among them are queued. They
    /// re-run only if the recompute produces a different value.
    pub fn mark_dirty(&self) {
        Runtime::invalidate(self.id());
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        Runtime::dirty_state(self.id()).unwrap_or(DirtyState::Dirty)
    }

    /// Get the number of computations currently reading this memo.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependent_count(self.id())
    }

    /// Get the number of nodes read by the last evaluation.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.id())
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("value", &*self.inner.value.read())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

/// Create a derived cell.
pub fn derived<T, F>(compute: F) -> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn memo_computes_on_first_access() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        // Not computed yet
        assert!(!memo.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        // First access triggers computation
        let value = memo.get();
        assert_eq!(value, 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(memo.has_value());
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.peek(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_recomputes_when_a_dependency_changes() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        let source = Signal::new(2);
        let source_clone = source.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            source_clone.get() * 10
        });

        assert_eq!(memo.get(), 20);
        assert_eq!(memo.dependency_count(), 1);

        source.set(3);
        assert_eq!(memo.state(), DirtyState::Dirty);
        assert_eq!(memo.get(), 30);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn memo_recomputes_when_marked_dirty() {
        let counter = Arc::new(AtomicI32::new(0));
        let counter_clone = counter.clone();

        let memo = Memo::new(move || counter_clone.load(Ordering::SeqCst));

        assert_eq!(memo.get(), 0);

        counter.store(5, Ordering::SeqCst);
        memo.mark_dirty();

        assert_eq!(memo.get(), 5);
    }

    #[test]
    fn maybe_dirty_memo_skips_recompute_when_upstream_is_unchanged() {
        let source = Signal::new(4);
        let parity = {
            let source = source.clone();
            Memo::new(move || source.get() % 2 == 0)
        };

        let downstream_runs = Arc::new(AtomicI32::new(0));
        let label = {
            let parity = parity.clone();
            let runs = downstream_runs.clone();
            Memo::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                if parity.get() { "even" } else { "odd" }
            })
        };

        assert_eq!(label.get(), "even");
        source.set(6);
        assert_eq!(label.state(), DirtyState::MaybeDirty);

        assert_eq!(label.get(), "even");
        assert_eq!(downstream_runs.load(Ordering::SeqCst), 1);
        assert_eq!(label.state(), DirtyState::Clean);

        source.set(7);
        assert_eq!(label.get(), "odd");
        assert_eq!(downstream_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dependencies_follow_the_branch_taken() {
        let flag = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);

        let memo = {
            let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
            Memo::new(move || if flag.get() { a.get() } else { b.get() })
        };

        assert_eq!(memo.get(), 1);
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 0);

        flag.set(false);
        assert_eq!(memo.get(), 2);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn reading_itself_is_a_cycle() {
        let slot: Arc<Mutex<Option<Memo<bool>>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();

        let memo = Memo::new(move || {
            let this = slot_clone.lock().clone();
            match this {
                Some(memo) => matches!(memo.try_get(), Err(ReactiveError::Cycle(_))),
                None => false,
            }
        });
        *slot.lock() = Some(memo.clone());

        assert!(memo.get());

        // break the reference cycle
        slot.lock().take();
    }

    #[test]
    fn memo_clone_shares_state() {
        let memo1 = Memo::new(|| 42);
        assert_eq!(memo1.get(), 42);

        let memo2 = memo1.clone();
        assert_eq!(memo1.id(), memo2.id());
        assert!(memo2.has_value());

        memo1.mark_dirty();
        assert_eq!(memo2.state(), DirtyState::Dirty);
    }

    #[test]
    fn memo_state_transitions() {
        let memo = derived(|| 42);

        // Starts dirty
        assert_eq!(memo.state(), DirtyState::Dirty);

        // After get, becomes clean
        memo.get();
        assert_eq!(memo.state(), DirtyState::Clean);

        memo.mark_dirty();
        assert_eq!(memo.state(), DirtyState::Dirty);

        memo.get();
        assert_eq!(memo.state(), DirtyState::Clean);
    }

    #[test]
    fn marking_dirty_keeps_later_writes_flowing() {
        let source = Signal::new(1);
        let scaled = {
            let source = source.clone();
            derived(move || source.get() * 10)
        };
        let seen = Arc::new(AtomicI32::new(0));

        let fx = {
            let (scaled, seen) = (scaled.clone(), seen.clone());
            crate::reactive::Effect::new(move || {
                seen.store(scaled.get(), Ordering::SeqCst);
            })
        };
        assert_eq!(fx.run_count(), 1);

        // same value after recompute: the reader is checked, not re-run
        scaled.mark_dirty();
        assert_eq!(fx.run_count(), 1);
        assert_eq!(scaled.state(), DirtyState::Clean);

        source.set(2);
        assert_eq!(seen.load(Ordering::SeqCst), 20);
        source.set(3);
        assert_eq!(seen.load(Ordering::SeqCst), 30);
        assert_eq!(fx.run_count(), 3);
        fx.dispose();
    }
}
