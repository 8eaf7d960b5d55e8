//! Deep Reactivity
//!
//! Makes ordinary nested data reactive without declaring a cell per field.
//! Plain containers ([`Target`]) are wrapped in a [`Proxy`] that tracks every
//! read against a per-key invalidation cell and triggers those cells on
//! writes. Nested containers are wrapped lazily as they are read.
//!
//! # How Deep Reactivity Works
//!
//! 1. `deep_reactive(target)` returns the cached wrapper for that target and
//!    mode, creating it if needed.
//!
//! 2. `proxy.get("a")` inside an effect calls `track(target, Value("a"))`,
//!    which reads the invalidation cell for that key and so subscribes the
//!    effect to it.
//!
//! 3. `proxy.set("a", 2)` writes the raw target, then calls `trigger` with
//!    `Set` (existing key, different value) or `Add` (new key). The trigger
//!    table decides which cells to bump: here the value cell of `"a"`, plus
//!    the iteration cell if the key was new.
//!
//! 4. Effects subscribed to a bumped cell re-run at the end of the batch.
//!
//! Dependency cells and wrappers are side tables keyed by the target's id and
//! freed with the target, so observing data never keeps it alive.

mod collections;
mod deep_signal;
mod handlers;
mod reactivity;
mod target;
pub mod tracking;
mod value;

pub use deep_signal::{deep_signal, DeepSignal};
pub use reactivity::{
    deep_reactive, deep_readonly, freeze, is_proxy, is_reactive, is_readonly, is_shallow,
    mark_raw, shallow_reactive, shallow_readonly, to_deep_reactive, to_deep_readonly, to_raw,
    wrapper_count, Proxy, ReactiveMode,
};
pub use target::{Container, Target, TargetId, TargetKind, WeakTarget};
pub use tracking::{track, trigger, trigger_length, DepKey, TriggerOp};
pub use value::{same_value, Key, Opaque, Value};
