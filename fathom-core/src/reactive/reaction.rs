//! Reactions
//!
//! A reaction is an effect split in two: a tracked dependency function and
//! an untracked body that receives its result. Only what the dependency
//! function reads can re-run the body.

use super::context::untracked;
use super::effect::{Effect, EffectResult};
use super::memo::Memo;

/// Options for [`reaction`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionOptions {
    /// Run the dependency function through a memo, so the body only runs
    /// when its result actually changes.
    pub memoize: bool,
}

impl ReactionOptions {
    pub fn memoized() -> Self {
        Self { memoize: true }
    }
}

/// Passed to a reaction body on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionRun {
    /// `true` only for the run made at creation.
    pub is_first: bool,
}

/// Create a reaction.
///
/// `deps` is tracked; `body` runs untracked with the value `deps` produced.
/// The body may return a [`Cleanup`](super::Cleanup) like any effect.
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use fathom_core::{cell, reaction, ReactionOptions};
///
/// let count = cell(0);
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let fx = {
///     let (count, seen) = (count.clone(), seen.clone());
///     reaction(
///         move || count.get(),
///         move |value, run| seen.lock().push((value, run.is_first)),
///         ReactionOptions::default(),
///     )
/// };
///
/// count.set(1);
/// assert_eq!(*seen.lock(), vec![(0, true), (1, false)]);
/// fx.dispose();
/// ```
pub fn reaction<T, D, F, R>(deps: D, mut body: F, options: ReactionOptions) -> Effect
where
    T: Clone + Send + Sync + PartialEq + 'static,
    D: Fn() -> T + Send + Sync + 'static,
    F: FnMut(T, ReactionRun) -> R + Send + 'static,
    R: EffectResult,
{
    let deps: Box<dyn Fn() -> T + Send + Sync> = if options.memoize {
        let memo = Memo::new(deps);
        Box::new(move || memo.get())
    } else {
        Box::new(deps)
    };

    let mut is_first = true;
    Effect::new(move || {
        let value = deps();
        let run = ReactionRun { is_first };
        is_first = false;
        untracked(|| body(value, run)).into_cleanup()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn body_reads_are_not_tracked() {
        let dep = Signal::new(0);
        let other = Signal::new(0);
        let calls = Arc::new(AtomicI32::new(0));

        let fx = {
            let (dep, other, calls) = (dep.clone(), other.clone(), calls.clone());
            reaction(
                move || dep.get(),
                move |_, _| {
                    other.get();
                    calls.fetch_add(1, Ordering::SeqCst);
                },
                ReactionOptions::default(),
            )
        };
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        other.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        dep.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        fx.dispose();
    }

    #[test]
    fn assigning_to_deps_from_the_body_reruns_it() {
        let sig = Signal::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let fx = {
            let (sig, writer, seen) = (sig.clone(), sig.clone(), seen.clone());
            reaction(
                move || sig.get(),
                move |value, run| {
                    seen.lock().push((value, run.is_first));
                    if value % 2 == 0 {
                        writer.set(value + 1);
                    }
                },
                ReactionOptions::default(),
            )
        };

        sig.set(2);
        assert_eq!(sig.peek(), 3);
        assert_eq!(*seen.lock(), vec![(1, true), (2, false), (3, false)]);
        fx.dispose();
    }

    #[test]
    fn memoized_deps_skip_equal_results() {
        let count = Signal::new(0);
        let calls = Arc::new(AtomicI32::new(0));

        let fx = {
            let (count, calls) = (count.clone(), calls.clone());
            reaction(
                move || count.get() / 10,
                move |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
                ReactionOptions::memoized(),
            )
        };

        count.set(3);
        count.set(7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        count.set(12);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        fx.dispose();
    }

    #[test]
    fn unmemoized_deps_rerun_on_every_change() {
        let count = Signal::new(0);
        let calls = Arc::new(AtomicI32::new(0));

        let fx = {
            let (count, calls) = (count.clone(), calls.clone());
            reaction(
                move || count.get() / 10,
                move |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
                ReactionOptions::default(),
            )
        };

        count.set(3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        fx.dispose();
    }
}
