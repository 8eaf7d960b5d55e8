//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a memo or effect), we push
//! the subscriber onto the stack. When the computation completes, we pop it
//! and hand the collected reads to the runtime, which rewires the graph.
//!
//! An untracked frame (pushed by [`untracked`]) has no subscriber: reads made
//! under it register nothing, even if an outer computation is running.
//!
//! The stack doubles as the cycle detector: a derived node that finds itself
//! on the stack is being read from its own computation.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::NodeId;

/// Reads collected during one evaluation: node and the version observed.
pub(crate) type Dependencies = SmallVec<[(NodeId, u64); 8]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The node being evaluated, `None` for an untracked frame.
    subscriber: Option<NodeId>,
    /// Dependencies collected during this computation, in read order.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber: Option<NodeId>,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given node.
    ///
    /// While this context is active, any signals that are read will
    /// register the node as a dependent.
    pub fn enter(subscriber: NodeId) -> Self {
        Self::push(Some(subscriber))
    }

    /// Enter a frame under which reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(subscriber: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber,
                dependencies: Dependencies::new(),
            });
        });

        Self {
            subscriber,
            finished: false,
        }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the node currently collecting dependencies, if any.
    pub fn current_subscriber() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber))
    }

    /// Whether `node` is somewhere on this thread's evaluation stack.
    pub fn is_evaluating(node: NodeId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| entry.subscriber == Some(node))
        })
    }

    /// Record a read of `node` at `version` in the innermost frame.
    ///
    /// Repeated reads of the same node are recorded once.
    pub fn track_dependency(node: NodeId, version: u64) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber.is_none() || entry.subscriber == Some(node) {
                    return;
                }
                if !entry.dependencies.iter().any(|(id, _)| *id == node) {
                    entry.dependencies.push((node, version));
                }
            }
        });
    }

    /// Pop the frame and return what was read under it.
    pub(crate) fn finish(mut self) -> Dependencies {
        self.finished = true;
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            match popped {
                Some(entry) => {
                    debug_assert_eq!(
                        entry.subscriber, self.subscriber,
                        "ReactiveContext mismatch: expected {:?}, got {:?}",
                        self.subscriber, entry.subscriber
                    );
                    entry.dependencies
                }
                None => Dependencies::new(),
            }
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber, self.subscriber,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber, entry.subscriber
                );
            }
        });
    }
}

/// Run `f` without registering any of its reads as dependencies.
///
/// ```
/// use fathom_core::{cell, derived, untracked};
///
/// let a = cell(1);
/// let b = cell(10);
/// let sum = {
///     let (a, b) = (a.clone(), b.clone());
///     derived(move || a.get() + untracked(|| b.get()))
/// };
/// assert_eq!(sum.get(), 11);
/// assert_eq!(sum.dependency_count(), 1);
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _frame = ReactiveContext::untracked();
    f()
}
