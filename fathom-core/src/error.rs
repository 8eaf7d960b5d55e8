//! Error Types
//!
//! Two error families live here:
//!
//! - [`ReactiveError`]: programmer misuse of the reactive graph or of a
//!   deep-reactive wrapper (cycles, readonly writes, bad keys). These are
//!   returned synchronously to the caller that caused them.
//! - [`ResourceError`]: everything a [`Resource`](crate::resource::Resource)
//!   can report. Fetch failures are stored in the resource state as data
//!   rather than propagated.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

use crate::graph::NodeId;

/// Boxed error returned by resource fetchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the dependency graph and the deep-reactivity layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A derived node was read while it was already being evaluated.
    #[error("cycle detected while evaluating derived node {0}")]
    Cycle(NodeId),

    /// A write was attempted through a readonly wrapper.
    #[error("cannot write `{key}`: target is readonly")]
    ReadonlyWrite { key: String },

    /// A write was attempted on a frozen target.
    #[error("cannot write `{key}`: target is frozen")]
    Frozen { key: String },

    /// The key cannot address a slot of this container.
    #[error("`{key}` is not a valid key for a {kind} target")]
    InvalidKey { key: String, kind: &'static str },

    /// The operation does not exist for this container.
    #[error("`{operation}` is not supported on a {kind} target")]
    UnsupportedOperation {
        operation: &'static str,
        kind: &'static str,
    },

    /// Effects kept re-triggering each other past the configured limit.
    #[error("effects re-triggered each other for more than {0} flush rounds")]
    FlushLimit(usize),
}

/// Errors surfaced by a resource.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    /// An action was called on a disposed resource.
    #[error("resource has been disposed")]
    Disposed,

    /// `refetch` was called on a manual resource that is not active.
    #[error("resource is not active")]
    Inactive,

    /// The fetcher returned a future but no tokio runtime was available.
    #[error("no tokio runtime available to drive the fetch")]
    NoRuntime,

    /// The fetcher reported an error.
    #[error("fetch failed: {0}")]
    Fetch(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The fetcher panicked, synchronously or while being polled.
    #[error("fetcher panicked: {0}")]
    Panicked(String),
}

impl ResourceError {
    /// Wrap an error returned by a fetcher.
    pub fn fetch(error: BoxError) -> Self {
        Self::Fetch(Arc::from(error))
    }

    /// Convert a caught panic payload into an error.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}
