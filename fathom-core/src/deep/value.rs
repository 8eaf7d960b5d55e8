//! Dynamic Values
//!
//! Deep reactivity works on a dynamic value model: primitives, raw
//! [`Target`] containers, reactive [`Proxy`] wrappers and opaque host values
//! that are never wrapped (timestamps, handles, anything `Any`).
//!
//! Equality follows `Object.is`: containers and opaque values compare by
//! identity, `NaN` equals itself and `0.0` differs from `-0.0`. Collection
//! keys use [`Key`], which follows `SameValueZero` instead (`0.0 == -0.0`).

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::reactivity::Proxy;
use super::target::{Container, Target, TargetId};
use crate::error::ReactiveError;

/// A host value carried through the deep layer untouched.
#[derive(Clone)]
pub struct Opaque {
    id: u64,
    value: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            value: Arc::new(value),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({})", self.id)
    }
}

/// A dynamically typed value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// A raw container. Reads and writes through it are not observed.
    Object(Target),
    /// A reactive wrapper around a container.
    Proxy(Proxy),
    Opaque(Opaque),
}

impl Value {
    /// Whether this value is a container, raw or wrapped.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Proxy(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64()
            .filter(|n| n.fract() == 0.0 && n.is_finite())
            .map(|n| n as i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Object(target) => Some(target),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<Proxy> {
        match self {
            Value::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Value::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }

    /// The raw container behind this value, looking through wrappers.
    pub fn raw_target(&self) -> Option<Target> {
        match self {
            Value::Object(target) => Some(target.clone()),
            Value::Proxy(proxy) => Some(proxy.raw()),
            _ => None,
        }
    }

    /// Short name of the value's type, for messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(target) => target.kind().as_str(),
            Value::Proxy(proxy) => proxy.kind().as_str(),
            Value::Opaque(_) => "opaque",
        }
    }
}

/// `Object.is`.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => {
            (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
        }
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        (Value::Proxy(a), Value::Proxy(b)) => a.ptr_eq(b),
        (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

/// Format a number the way a property key spells it.
fn number_key(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        n.to_string()
    }
}

/// Convert a value to an object property name.
pub(crate) fn to_property_key(key: &Value) -> Result<String, ReactiveError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(number_key(*n)),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(ReactiveError::InvalidKey {
            key: format!("{other:?}"),
            kind: "object",
        }),
    }
}

/// Longest array a target may hold.
pub(crate) const MAX_ARRAY_LEN: usize = u32::MAX as usize;

/// Interpret a value as an array index.
///
/// Numbers must be non-negative integers; strings must be their canonical
/// decimal spelling (`"3"`, not `"03"`). Indices stop one short of
/// [`MAX_ARRAY_LEN`].
pub(crate) fn as_index(key: &Value) -> Option<usize> {
    as_bounded(key, MAX_ARRAY_LEN - 1)
}

/// Interpret a value as an array length.
pub(crate) fn as_length(value: &Value) -> Option<usize> {
    as_bounded(value, MAX_ARRAY_LEN)
}

fn as_bounded(key: &Value, max: usize) -> Option<usize> {
    match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= max as f64 => {
            Some(*n as usize)
        }
        Value::String(s) => s
            .parse::<usize>()
            .ok()
            .filter(|index| *index <= max && index.to_string() == *s),
        _ => None,
    }
}

/// Identity of a collection key or a tracked property.
///
/// Keys never own what they identify, so an observation keyed on an
/// object does not keep that object alive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Null,
    Bool(bool),
    /// Normalized bits: `-0.0` is `0.0` and every `NaN` is the same key.
    Number(u64),
    String(String),
    Object(TargetId),
    Opaque(u64),
}

impl Key {
    /// The key identifying `value` under `SameValueZero`.
    ///
    /// Wrappers identify their raw target.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Key::Null,
            Value::Bool(b) => Key::Bool(*b),
            Value::Number(n) => Key::number(*n),
            Value::String(s) => Key::String(s.clone()),
            Value::Object(target) => Key::Object(target.id()),
            Value::Proxy(proxy) => Key::Object(proxy.raw().id()),
            Value::Opaque(opaque) => Key::Opaque(opaque.id),
        }
    }

    pub fn number(n: f64) -> Self {
        let n = if n == 0.0 { 0.0 } else { n };
        let bits = if n.is_nan() { f64::NAN.to_bits() } else { n.to_bits() };
        Key::Number(bits)
    }

    pub fn index(index: usize) -> Self {
        Key::number(index as f64)
    }

    pub fn name(name: impl Into<String>) -> Self {
        Key::String(name.into())
    }

    /// The array index this key names, if any.
    pub(crate) fn as_index(&self) -> Option<usize> {
        match self {
            Key::Number(bits) => {
                let n = f64::from_bits(*bits);
                let index = n >= 0.0 && n.fract() == 0.0 && n < MAX_ARRAY_LEN as f64;
                index.then_some(n as usize)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => f.write_str("null"),
            Key::Bool(b) => write!(f, "{b}"),
            Key::Number(bits) => f.write_str(&number_key(f64::from_bits(*bits))),
            Key::String(s) => f.write_str(s),
            Key::Object(id) => write!(f, "[object {id}]"),
            Key::Opaque(id) => write!(f, "[opaque {id}]"),
        }
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

macro_rules! from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Number(value as f64)
                }
            }
        )*
    };
}

from_integer!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Target> for Value {
    fn from(value: Target) -> Self {
        Value::Object(value)
    }
}

impl From<Proxy> for Value {
    fn from(value: Proxy) -> Self {
        Value::Proxy(value)
    }
}

impl From<Opaque> for Value {
    fn from(value: Opaque) -> Self {
        Value::Opaque(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Deep copy into fresh raw targets.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Object(Target::array_from(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(fields) => Value::Object(Target::object_from(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

impl Value {
    /// Snapshot the current raw contents as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

// ----------------------------------------------------------------------------
// Serialization
// ----------------------------------------------------------------------------

thread_local! {
    /// Containers currently being serialized on this thread.
    static SERIALIZING: RefCell<Vec<TargetId>> = const { RefCell::new(Vec::new()) };
}

struct CycleGuard(TargetId);

impl CycleGuard {
    fn enter(id: TargetId) -> Option<Self> {
        SERIALIZING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&id) {
                None
            } else {
                stack.push(id);
                Some(CycleGuard(id))
            }
        })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        SERIALIZING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.0) {
                stack.remove(pos);
            }
        });
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Object(target) => serialize_target(target, serializer),
            Value::Proxy(proxy) => serialize_target(&proxy.raw(), serializer),
            Value::Opaque(_) => Err(S::Error::custom("opaque values cannot be serialized")),
        }
    }
}

fn serialize_target<S: Serializer>(target: &Target, serializer: S) -> Result<S::Ok, S::Error> {
    let Some(_guard) = CycleGuard::enter(target.id()) else {
        return Err(S::Error::custom(format!(
            "cyclic reference through target {}",
            target.id()
        )));
    };

    // Snapshot first: serializing nested values must not hold this lock.
    let snapshot = target.with(|container| match container {
        Container::Object(fields) => Ok(Snapshot::Fields(
            fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )),
        Container::Array(items) => Ok(Snapshot::Items(items.clone())),
        Container::Map(entries) => Ok(Snapshot::Pairs(entries.values().cloned().collect())),
        Container::Set(items) => Ok(Snapshot::Items(items.values().cloned().collect())),
        Container::WeakMap(_) | Container::WeakSet(_) => Err(target.kind().as_str()),
    });

    match snapshot {
        Ok(Snapshot::Fields(fields)) => {
            let mut map = serializer.serialize_map(Some(fields.len()))?;
            for (k, v) in &fields {
                map.serialize_entry(k, v)?;
            }
            map.end()
        }
        Ok(Snapshot::Items(items)) => {
            let mut seq = serializer.serialize_seq(Some(items.len()))?;
            for item in &items {
                seq.serialize_element(item)?;
            }
            seq.end()
        }
        Ok(Snapshot::Pairs(pairs)) => {
            let mut seq = serializer.serialize_seq(Some(pairs.len()))?;
            for pair in &pairs {
                seq.serialize_element(&[&pair.0, &pair.1])?;
            }
            seq.end()
        }
        Err(kind) => Err(S::Error::custom(format!("a {kind} cannot be serialized"))),
    }
}

enum Snapshot {
    Fields(Vec<(String, Value)>),
    Items(Vec<Value>),
    Pairs(Vec<(Value, Value)>),
}
