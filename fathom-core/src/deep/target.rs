//! Raw Targets
//!
//! A [`Target`] is a shared, unobserved container: an object with ordered
//! string keys, an array, a map, a set, or a weak map/set keyed by other
//! targets. Reading or writing a target directly never tracks or triggers
//! anything; wrap it with [`deep_reactive`](super::deep_reactive) (or one of
//! its siblings) to observe it.
//!
//! Every target owns a unique [`TargetId`]. Dependency cells and wrapper
//! caches are side tables keyed by that id, and the target removes its own
//! entries when it is dropped, so observing a target never keeps it alive.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::value::{Key, Value};
use super::{reactivity, tracking};
use crate::error::ReactiveError;

/// Unique identifier of a raw target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// The shape of a target. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Object,
    Array,
    Map,
    Set,
    WeakMap,
    WeakSet,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Object => "object",
            TargetKind::Array => "array",
            TargetKind::Map => "map",
            TargetKind::Set => "set",
            TargetKind::WeakMap => "weak map",
            TargetKind::WeakSet => "weak set",
        }
    }

    /// Maps, sets and their weak variants.
    pub fn is_collection(&self) -> bool {
        !matches!(self, TargetKind::Object | TargetKind::Array)
    }

    pub fn is_weak(&self) -> bool {
        matches!(self, TargetKind::WeakMap | TargetKind::WeakSet)
    }
}

/// The storage behind a target.
#[derive(Debug)]
pub enum Container {
    Object(IndexMap<String, Value>),
    Array(Vec<Value>),
    /// Key identity to the original key value and the mapped value.
    Map(IndexMap<Key, (Value, Value)>),
    /// Key identity to the original member value.
    Set(IndexMap<Key, Value>),
    WeakMap(HashMap<TargetId, (WeakTarget, Value)>),
    WeakSet(HashMap<TargetId, WeakTarget>),
}

impl Container {
    pub fn kind(&self) -> TargetKind {
        match self {
            Container::Object(_) => TargetKind::Object,
            Container::Array(_) => TargetKind::Array,
            Container::Map(_) => TargetKind::Map,
            Container::Set(_) => TargetKind::Set,
            Container::WeakMap(_) => TargetKind::WeakMap,
            Container::WeakSet(_) => TargetKind::WeakSet,
        }
    }

    /// Number of entries. Weak containers count live keys only.
    pub fn len(&self) -> usize {
        match self {
            Container::Object(fields) => fields.len(),
            Container::Array(items) => items.len(),
            Container::Map(entries) => entries.len(),
            Container::Set(items) => items.len(),
            Container::WeakMap(entries) => entries.values().filter(|(k, _)| k.is_alive()).count(),
            Container::WeakSet(items) => items.values().filter(|k| k.is_alive()).count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct TargetInner {
    id: TargetId,
    kind: TargetKind,
    data: RwLock<Container>,
    /// Never wrap (see `mark_raw`).
    skip: AtomicBool,
    /// Not extensible: writes fail and it is never wrapped.
    frozen: AtomicBool,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        tracking::forget(self.id);
        reactivity::forget(self.id);
    }
}

/// A shared raw container.
#[derive(Clone)]
pub struct Target {
    inner: Arc<TargetInner>,
}

/// A reference to a target that does not keep it alive.
#[derive(Clone)]
pub struct WeakTarget(Weak<TargetInner>);

impl WeakTarget {
    pub fn upgrade(&self) -> Option<Target> {
        self.0.upgrade().map(|inner| Target { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_alive() { "WeakTarget" } else { "WeakTarget(dead)" })
    }
}

impl Target {
    pub fn new(container: Container) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                id: TargetId::new(),
                kind: container.kind(),
                data: RwLock::new(container),
                skip: AtomicBool::new(false),
                frozen: AtomicBool::new(false),
            }),
        }
    }

    /// An empty object.
    pub fn object() -> Self {
        Self::new(Container::Object(IndexMap::new()))
    }

    pub fn array() -> Self {
        Self::new(Container::Array(Vec::new()))
    }

    pub fn map() -> Self {
        Self::new(Container::Map(IndexMap::new()))
    }

    pub fn set() -> Self {
        Self::new(Container::Set(IndexMap::new()))
    }

    pub fn weak_map() -> Self {
        Self::new(Container::WeakMap(HashMap::new()))
    }

    pub fn weak_set() -> Self {
        Self::new(Container::WeakSet(HashMap::new()))
    }

    /// An object with the given fields, in order.
    pub fn object_from<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(Container::Object(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn array_from<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::new(Container::Array(items.into_iter().collect()))
    }

    pub fn map_from<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        Self::new(Container::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Key::of(&k), (k, v)))
                .collect(),
        ))
    }

    pub fn set_from<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::new(Container::Set(
            items.into_iter().map(|v| (Key::of(&v), v)).collect(),
        ))
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.kind
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakTarget {
        WeakTarget(Arc::downgrade(&self.inner))
    }

    /// Read the container. Nothing is tracked.
    pub fn with<R>(&self, f: impl FnOnce(&Container) -> R) -> R {
        f(&self.inner.data.read())
    }

    /// Mutate the container. Nothing is triggered.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Container) -> R) -> Result<R, ReactiveError> {
        self.write("*", f)
    }

    /// Mutate the container, naming `key` if the target is frozen.
    pub(crate) fn write<R>(
        &self,
        key: impl fmt::Display,
        f: impl FnOnce(&mut Container) -> R,
    ) -> Result<R, ReactiveError> {
        if self.is_frozen() {
            return Err(ReactiveError::Frozen {
                key: key.to_string(),
            });
        }
        Ok(f(&mut self.inner.data.write()))
    }

    /// Number of entries (array length, collection size, field count).
    pub fn len(&self) -> usize {
        self.with(Container::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a field of an object target.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.with(|container| match container {
            Container::Object(fields) => fields.get(name).cloned(),
            _ => None,
        })
    }

    /// Write a field of an object target, returning the previous value.
    pub fn insert(
        &self,
        name: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, ReactiveError> {
        let name = name.into();
        let kind = self.kind();
        self.write(&name, |container| match container {
            Container::Object(fields) => Ok(fields.insert(name.clone(), value)),
            _ => Err(ReactiveError::UnsupportedOperation {
                operation: "insert",
                kind: kind.as_str(),
            }),
        })?
    }

    /// Remove a field of an object target.
    pub fn remove(&self, name: &str) -> Result<Option<Value>, ReactiveError> {
        let kind = self.kind();
        self.write(name, |container| match container {
            Container::Object(fields) => Ok(fields.shift_remove(name)),
            _ => Err(ReactiveError::UnsupportedOperation {
                operation: "remove",
                kind: kind.as_str(),
            }),
        })?
    }

    /// Append to an array target.
    pub fn push(&self, value: Value) -> Result<(), ReactiveError> {
        let kind = self.kind();
        self.write("push", |container| match container {
            Container::Array(items) => {
                items.push(value);
                Ok(())
            }
            _ => Err(ReactiveError::UnsupportedOperation {
                operation: "push",
                kind: kind.as_str(),
            }),
        })?
    }

    /// Never wrap this target.
    pub fn mark_raw(&self) {
        self.inner.skip.store(true, Ordering::SeqCst);
    }

    pub fn is_skipped(&self) -> bool {
        self.inner.skip.load(Ordering::SeqCst)
    }

    /// Make the target non-extensible: later writes fail and it is never wrapped.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}
