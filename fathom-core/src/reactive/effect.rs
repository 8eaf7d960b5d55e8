//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued on the current batch
//!    and re-runs when the outermost batch exits.
//!
//! 3. A queued effect that was only reached through memos first checks
//!    whether any of those memos really produced a new value.
//!
//! 4. Each run replaces the effect's dependencies with exactly what it read.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos are freed with their last handle; effects live until disposed.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called, untracked,
//! before the effect re-runs and when the effect is disposed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::batch::{batch, schedule};
use super::context::{untracked, ReactiveContext};
use super::runtime::{NodeHandle, Reactive, Runtime};
use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKind};

/// A function run before an effect re-runs and when it is disposed.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    fn run(self) {
        untracked(self.0);
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// What an effect function may return.
pub trait EffectResult {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl EffectResult for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl EffectResult for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl EffectResult for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

type EffectFn = Box<dyn FnMut() -> Option<Cleanup> + Send>;

struct EffectInner {
    node: NodeHandle,

    /// The effect function.
    run: Mutex<EffectFn>,

    /// Cleanup returned by the latest run.
    cleanup: Mutex<Option<Cleanup>>,

    /// Whether the effect has been disposed.
    disposed: AtomicBool,

    /// Number of times the effect has run.
    run_count: AtomicUsize,
}

impl EffectInner {
    /// Run the effect function within a reactive context.
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        let id = self.node.id();
        let previous = self.cleanup.lock().take();
        if let Some(cleanup) = previous {
            cleanup.run();
        }

        batch(|| {
            let ctx = ReactiveContext::enter(id);
            let cleanup = {
                let mut run = self.run.lock();
                (*run)()
            };
            let dependencies = ctx.finish();

            // Wrote to something it read: run again in the same flush.
            if Runtime::commit_dependencies(id, dependencies) {
                schedule([id]);
            }
            let runs = self.run_count.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(node = %id, runs, "effect ran");

            // Disposed from inside its own run: nothing will call this later.
            if self.disposed.load(Ordering::SeqCst) {
                if let Some(cleanup) = cleanup {
                    cleanup.run();
                }
            } else {
                *self.cleanup.lock() = cleanup;
            }
        });
    }
}

impl Reactive for EffectInner {
    fn node_id(&self) -> NodeId {
        self.node.id()
    }

    fn update(&self) -> Result<(), ReactiveError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if Runtime::needs_update(self.node.id())? {
            self.execute();
        }
        Ok(())
    }

    fn is_eager(&self) -> bool {
        true
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The runtime keeps the effect alive until [`dispose`](Self::dispose) is
/// called; dropping every handle does not stop it.
///
/// # Example
///
/// ```
/// use fathom_core::{Effect, Signal};
///
/// let count = Signal::new(0);
///
/// let effect = {
///     let count = count.clone();
///     Effect::new(move || {
///         println!("Count is: {}", count.get());
///     })
/// };
///
/// count.set(5); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F, R>(run: F) -> Self
    where
        F: FnMut() -> R + Send + 'static,
        R: EffectResult,
    {
        let effect = Self::new_lazy(run);
        effect.inner.execute();
        effect
    }

    /// Create a new effect without running it.
    ///
    /// It has no dependencies until [`execute`](Self::execute) is called.
    pub fn new_lazy<F, R>(mut run: F) -> Self
    where
        F: FnMut() -> R + Send + 'static,
        R: EffectResult,
    {
        let inner = Arc::new(EffectInner {
            node: NodeHandle::new(NodeKind::Effect),
            run: Mutex::new(Box::new(move || run().into_cleanup())),
            cleanup: Mutex::new(None),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        Runtime::retain_effect(inner.clone());
        Self { inner }
    }

    /// Get the effect's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.node.id()
    }

    /// Run the effect now, whether or not a dependency changed.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Dispose of the effect.
    ///
    /// Runs the latest cleanup and removes every edge. After disposal, the
    /// effect will not run again.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let id = self.id();
        Runtime::remove_node(id);
        Runtime::release_effect(id);
        tracing::debug!(node = %id, "effect disposed");

        let cleanup = self.inner.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of nodes read by the latest run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.id())
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect.
pub fn effect<F, R>(run: F) -> Effect
where
    F: FnMut() -> R + Send + 'static,
    R: EffectResult,
{
    Effect::new(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
