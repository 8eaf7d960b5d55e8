//! Reactive Primitives
//!
//! Cells, derived cells and effects, and the runtime that wires them into a
//! dependency graph.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Signal`] (built with [`cell`]) holds a value. Reading it inside a
//! memo or effect records an edge from the reader to the cell; writing a
//! different value bumps its version and marks every reader stale.
//!
//! ## Derived Cells
//!
//! A [`Memo`] (built with [`derived`]) caches a function of other nodes. It
//! recomputes lazily, and only when an upstream version actually moved. An
//! unchanged result keeps its version, so its own readers stay clean.
//!
//! ## Effects
//!
//! An [`Effect`] re-runs a side-effecting closure after its dependencies
//! change. A [`reaction`] is an effect whose body runs untracked and sees
//! only the value of its dependency function.
//!
//! ## Batches
//!
//! Writes inside [`batch`] propagate immediately, but effects run once, when
//! the outermost batch exits. [`untracked`] reads record nothing.
//!
//! # Implementation Notes
//!
//! The evaluation stack is thread-local ([`ReactiveContext`]); node states,
//! edges and versions live in one process-wide table owned by [`Runtime`].
//! Writes push dirtiness down the graph, reads pull fresh values up.

mod batch;
mod context;
mod effect;
mod memo;
mod reaction;
mod runtime;
mod signal;

pub use batch::{batch, is_batching};
pub use context::{untracked, ReactiveContext};
pub use effect::{effect, Cleanup, Effect, EffectResult};
pub use memo::{derived, Memo};
pub use reaction::{reaction, ReactionOptions, ReactionRun};
pub use runtime::{NodeHandle, Reactive, Runtime};
pub use signal::{cell, Signal, Subscription};
