//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! owns a source node in the dependency graph.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    read is recorded and becomes an edge once the computation finishes.
//!
//! 2. When a signal's value changes (as decided by its equality function),
//!    its version is bumped and dirtiness is pushed to every dependent.
//!
//! 3. Effects reached by the change run at the end of the current batch.
//!
//! # Thread Safety
//!
//! Signals are thread-safe. The value is protected by a `RwLock`; the graph
//! node lives in the runtime. Clones share both.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::untracked;
use super::effect::Effect;
use super::runtime::{NodeHandle, Runtime};
use crate::graph::{NodeId, NodeKind};

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```
/// use fathom_core::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// assert_eq!(count.peek(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// The source node; removed from the graph when the last clone drops.
    node: Arc<NodeHandle>,

    /// The current value.
    value: Arc<RwLock<T>>,

    /// Decides whether a write is a change.
    equals: fn(&T, &T) -> bool,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::new_with_equals(value, |a, b| a == b)
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a signal that uses `equals` to decide whether a write changed it.
    pub fn new_with_equals(value: T, equals: fn(&T, &T) -> bool) -> Self {
        Self {
            node: Arc::new(NodeHandle::new(NodeKind::Source)),
            value: Arc::new(RwLock::new(value)),
            equals,
        }
    }

    /// Get the signal's node ID.
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        Runtime::track_read(self.id());
        self.value.read().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track_read(self.id());
        f(&self.value.read())
    }

    /// Set a new value and notify subscribers if it changed.
    pub fn set(&self, value: T) {
        let changed = {
            let mut guard = self.value.write();
            if (self.equals)(&guard, &value) {
                false
            } else {
                *guard = value;
                true
            }
        };

        if changed {
            Runtime::notify_changed(self.id());
        }
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.value.read());
        self.set(new_value);
    }

    /// Mutate the value in place. Always notifies.
    pub fn update_in_place<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        f(&mut self.value.write());
        Runtime::notify_changed(self.id());
    }

    /// Call `f` with the current value now and after every change.
    ///
    /// Calls after the first one are deferred to the end of the current
    /// batch. `f` itself is untracked.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + 'static,
    {
        let signal = self.clone();
        let effect = Effect::new(move || {
            let value = signal.get();
            untracked(|| f(&value));
        });
        Subscription { effect }
    }

    /// Get the number of computations currently reading this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::dependent_count(self.id())
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            value: Arc::clone(&self.value),
            equals: self.equals,
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &*self.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a reactive cell.
pub fn cell<T>(value: T) -> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Signal::new(value)
}

/// A live [`Signal::subscribe`] callback.
///
/// The callback keeps running until [`unsubscribe`](Self::unsubscribe) is
/// called; dropping the handle does not stop it.
#[derive(Debug, Clone)]
pub struct Subscription {
    effect: Effect,
}

impl Subscription {
    /// Stop receiving updates.
    pub fn unsubscribe(&self) {
        self.effect.dispose();
    }

    pub fn is_active(&self) -> bool {
        !self.effect.is_disposed()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::batch;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);

        signal.update_in_place(|v| *v *= 2);
        assert_eq!(signal.peek(), 30);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let subscription = signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Runs once with the current value.
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        // Equal writes are not changes.
        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        subscription.unsubscribe();
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();

        let subscription = signal.subscribe(move |v| {
            seen_clone.store(*v, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 1);

        subscription.unsubscribe();
        assert!(!subscription.is_active());
        signal.set(2);
        // Should not have been called again
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn subscriptions_are_deferred_inside_a_batch() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let subscription = signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        batch(|| {
            signal.set(1);
            signal.set(2);
            signal.set(3);
            assert_eq!(call_count.load(Ordering::SeqCst), 1);
        });
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        subscription.unsubscribe();
    }

    #[test]
    fn custom_equality_decides_what_is_a_change() {
        let signal = Signal::new_with_equals(1.0_f64, |a, b| (a - b).abs() < 0.5);
        let version = Runtime::version(signal.id());

        signal.set(1.2);
        assert_eq!(signal.peek(), 1.0);
        assert_eq!(Runtime::version(signal.id()), version);

        signal.set(2.0);
        assert_eq!(signal.peek(), 2.0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn dropping_the_last_clone_frees_the_node() {
        let signal = Signal::new(String::from("x"));
        let id = signal.id();
        let other = signal.clone();

        drop(signal);
        assert!(Runtime::version(id).is_some());

        drop(other);
        assert!(Runtime::version(id).is_none());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = cell(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }
}
