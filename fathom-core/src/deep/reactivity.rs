//! Reactive Wrappers
//!
//! A [`Proxy`] intercepts every read and write of a raw [`Target`]: reads
//! are tracked against per-key invalidation cells, writes trigger them.
//!
//! # Modes
//!
//! | mode               | nested values        | writes  |
//! |--------------------|----------------------|---------|
//! | `Deep`             | wrapped `Deep`       | allowed |
//! | `Shallow`          | returned as stored   | allowed |
//! | `DeepReadonly`     | wrapped readonly     | `ReadonlyWrite` error |
//! | `ShallowReadonly`  | returned as stored   | `ReadonlyWrite` error |
//!
//! # Identity
//!
//! Wrappers are created through a get-or-create cache keyed by the raw
//! target's id, so wrapping the same target in the same mode returns the same
//! wrapper while any handle to it is alive. Nested targets are wrapped on
//! access through that same cache, which keeps shared and cyclic object
//! graphs finite.
//!
//! Wrapping an existing wrapper returns it unchanged, except that a readonly
//! request over a mutable wrapper produces a readonly wrapper delegating to
//! it. Frozen targets, targets marked with [`mark_raw`], opaque values and
//! primitives are never wrapped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;

use super::target::{Target, TargetId, TargetKind};
use super::tracking::{self, DepKey};
use super::value::Value;
use crate::error::ReactiveError;
use crate::reactive::Runtime;

/// How a wrapper treats writes and nested values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactiveMode {
    Deep,
    Shallow,
    DeepReadonly,
    ShallowReadonly,
}

impl ReactiveMode {
    pub fn is_readonly(&self) -> bool {
        matches!(self, ReactiveMode::DeepReadonly | ReactiveMode::ShallowReadonly)
    }

    pub fn is_shallow(&self) -> bool {
        matches!(self, ReactiveMode::Shallow | ReactiveMode::ShallowReadonly)
    }

    /// The mode nested objects are wrapped in, if any.
    pub fn nested(&self) -> Option<ReactiveMode> {
        match self {
            ReactiveMode::Deep => Some(ReactiveMode::Deep),
            ReactiveMode::DeepReadonly => Some(ReactiveMode::DeepReadonly),
            ReactiveMode::Shallow | ReactiveMode::ShallowReadonly => None,
        }
    }
}

pub(crate) struct ProxyInner {
    raw: Target,
    /// The mutable wrapper a readonly wrapper was created over.
    delegate: Option<Proxy>,
    mode: ReactiveMode,
}

/// A reactive wrapper around a raw target.
///
/// Clones are the same wrapper.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    /// Wrap `target` in `mode`.
    ///
    /// Returns `None` for frozen targets and targets marked raw.
    pub fn new(target: Target, mode: ReactiveMode) -> Option<Proxy> {
        if target.is_frozen() || target.is_skipped() {
            return None;
        }
        Some(get_or_create(target, None, mode))
    }

    pub fn mode(&self) -> ReactiveMode {
        self.inner.mode
    }

    /// The raw target, looking through every layer of wrapping.
    pub fn raw(&self) -> Target {
        self.inner.raw.clone()
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.raw.kind()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.mode.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.mode.is_shallow()
    }

    /// Mutable, or readonly over a mutable wrapper.
    pub fn is_reactive(&self) -> bool {
        match &self.inner.delegate {
            Some(delegate) => delegate.is_reactive(),
            None => !self.is_readonly(),
        }
    }

    pub(crate) fn delegate(&self) -> Option<&Proxy> {
        self.inner.delegate.as_ref()
    }

    pub(crate) fn target(&self) -> &Target {
        &self.inner.raw
    }

    /// Track a read on the raw target.
    pub(crate) fn track(&self, key: DepKey) {
        tracking::track(&self.inner.raw, key);
    }

    /// Wrap a value read out of the target according to this wrapper's mode.
    pub(crate) fn wrap_nested(&self, value: Value) -> Value {
        match self.inner.mode.nested() {
            Some(mode) => wrap(value, mode, false),
            None => value,
        }
    }

    /// Fail with `ReadonlyWrite` if this wrapper does not accept writes.
    pub(crate) fn check_writable(&self, key: impl fmt::Display) -> Result<(), ReactiveError> {
        if self.is_readonly() {
            let key = key.to_string();
            tracing::warn!(target_id = %self.inner.raw.id(), %key, "write through a readonly wrapper");
            return Err(ReactiveError::ReadonlyWrite { key });
        }
        Ok(())
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("target", &self.inner.raw.id())
            .field("kind", &self.kind())
            .field("mode", &self.inner.mode)
            .field("delegates", &self.inner.delegate.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Wrapper cache
// ----------------------------------------------------------------------------

/// Requested mode and, for delegating wrappers, the delegate's mode.
type CacheKey = (ReactiveMode, Option<ReactiveMode>);

static PROXIES: OnceLock<DashMap<TargetId, HashMap<CacheKey, Weak<ProxyInner>>>> = OnceLock::new();

fn proxies() -> &'static DashMap<TargetId, HashMap<CacheKey, Weak<ProxyInner>>> {
    PROXIES.get_or_init(DashMap::new)
}

fn get_or_create(raw: Target, delegate: Option<Proxy>, mode: ReactiveMode) -> Proxy {
    let key = (mode, delegate.as_ref().map(Proxy::mode));
    let id = raw.id();
    let mut entry = proxies().entry(id).or_default();

    let inner = match entry.get(&key).and_then(Weak::upgrade) {
        Some(inner) => inner,
        None => {
            tracing::trace!(target_id = %id, ?mode, "wrapper created");
            let inner = Arc::new(ProxyInner {
                raw,
                delegate,
                mode,
            });
            entry.insert(key, Arc::downgrade(&inner));
            inner
        }
    };
    drop(entry);
    Proxy { inner }
}

/// Number of live wrappers of a target.
pub fn wrapper_count(target: TargetId) -> usize {
    proxies().get(&target).map_or(0, |entry| {
        entry.values().filter(|weak| weak.strong_count() > 0).count()
    })
}

/// Drop the cache entry of a freed target.
pub(crate) fn forget(target: TargetId) {
    let removed = proxies().remove(&target);
    drop(removed);
}

// ----------------------------------------------------------------------------
// Wrapping
// ----------------------------------------------------------------------------

fn wrap(value: Value, mode: ReactiveMode, warn: bool) -> Value {
    match value {
        Value::Object(target) => {
            if target.is_frozen() || target.is_skipped() {
                return Value::Object(target);
            }
            Value::Proxy(get_or_create(target, None, mode))
        }
        Value::Proxy(proxy) => {
            if mode.is_readonly() && !proxy.is_readonly() {
                let raw = proxy.raw();
                Value::Proxy(get_or_create(raw, Some(proxy), mode))
            } else {
                Value::Proxy(proxy)
            }
        }
        Value::Opaque(_) => value,
        primitive => {
            if warn && Runtime::config().warn_non_observable {
                tracing::warn!(value = ?primitive, ?mode, "value cannot be made reactive");
            }
            primitive
        }
    }
}

/// Wrap a value so reads are tracked and writes trigger, recursively.
///
/// ```
/// use fathom_core::deep::{deep_reactive, is_reactive, to_raw, Target, Value};
///
/// let raw = Target::object_from([("count", Value::from(0))]);
/// let state = deep_reactive(raw.clone());
/// assert!(is_reactive(&state));
/// assert!(state == deep_reactive(raw.clone()));
/// assert!(to_raw(&state) == Value::Object(raw));
/// ```
pub fn deep_reactive(value: impl Into<Value>) -> Value {
    wrap(value.into(), ReactiveMode::Deep, true)
}

/// Like [`deep_reactive`], but nested values are returned as stored.
pub fn shallow_reactive(value: impl Into<Value>) -> Value {
    wrap(value.into(), ReactiveMode::Shallow, true)
}

/// A wrapper that tracks reads and rejects writes, recursively.
pub fn deep_readonly(value: impl Into<Value>) -> Value {
    wrap(value.into(), ReactiveMode::DeepReadonly, true)
}

/// Like [`deep_readonly`], but nested values are returned as stored.
pub fn shallow_readonly(value: impl Into<Value>) -> Value {
    wrap(value.into(), ReactiveMode::ShallowReadonly, true)
}

/// [`deep_reactive`] for objects, anything else unchanged and silently.
pub fn to_deep_reactive(value: impl Into<Value>) -> Value {
    wrap(value.into(), ReactiveMode::Deep, false)
}

/// [`deep_readonly`] for objects, anything else unchanged and silently.
pub fn to_deep_readonly(value: impl Into<Value>) -> Value {
    wrap(value.into(), ReactiveMode::DeepReadonly, false)
}

/// The raw target behind a wrapper, through every layer. Other values are
/// returned unchanged.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(proxy) => Value::Object(proxy.raw()),
        other => other.clone(),
    }
}

/// Never wrap this value's target. Returns the value.
pub fn mark_raw(value: impl Into<Value>) -> Value {
    let value = value.into();
    if let Some(target) = value.raw_target() {
        target.mark_raw();
    }
    value
}

/// Make this value's target non-extensible. Returns the value.
///
/// Later writes fail with `Frozen`, and the target is never wrapped again.
pub fn freeze(value: impl Into<Value>) -> Value {
    let value = value.into();
    if let Some(target) = value.raw_target() {
        target.freeze();
    }
    value
}

pub fn is_reactive(value: &Value) -> bool {
    value.as_proxy().is_some_and(Proxy::is_reactive)
}

pub fn is_readonly(value: &Value) -> bool {
    value.as_proxy().is_some_and(Proxy::is_readonly)
}

pub fn is_shallow(value: &Value) -> bool {
    value.as_proxy().is_some_and(Proxy::is_shallow)
}

/// Whether the value is any kind of wrapper.
pub fn is_proxy(value: &Value) -> bool {
    value.as_proxy().is_some()
}
