//! Wrapper Operations
//!
//! The read and write operations of a [`Proxy`]. Objects and arrays are
//! handled here; maps, sets and their weak variants live in
//! [`collections`](super::collections).
//!
//! Every read tracks the narrowest cell that describes what it looked at:
//! `get` the key's value, `has` the key's presence, `keys` the key set (or an
//! array's length). Every write compares before and after and triggers only
//! what actually changed. Readonly wrappers reject writes before touching the
//! target.

use std::fmt;
use std::ops::Range;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::collections;
use super::reactivity::{is_readonly, to_raw, Proxy};
use super::target::{Container, Target, TargetKind};
use super::tracking::{self, DepKey, TriggerOp};
use super::value::{as_index, as_length, same_value, to_property_key, Key, Value, MAX_ARRAY_LEN};
use crate::error::ReactiveError;
use crate::reactive::batch;

pub(super) fn unsupported(operation: &'static str, kind: TargetKind) -> ReactiveError {
    ReactiveError::UnsupportedOperation {
        operation,
        kind: kind.as_str(),
    }
}

/// A readable spelling of a key for error messages.
pub(super) fn key_label(key: &Value) -> String {
    to_property_key(key).unwrap_or_else(|_| format!("[{}]", key.type_name()))
}

enum ArrayKey {
    Length,
    Index(usize),
}

/// Existing slots an array mutation may overwrite in place.
#[derive(Clone, Copy)]
enum Span {
    /// One slot.
    At(usize),
    /// Every slot from here to the end.
    From(usize),
    /// None; only the length changes.
    End,
}

impl Span {
    fn range(self, len: usize) -> Range<usize> {
        match self {
            Span::At(index) => index.min(len)..index.saturating_add(1).min(len),
            Span::From(index) => index.min(len)..len,
            Span::End => len..len,
        }
    }
}

fn length_error(len: impl fmt::Display) -> ReactiveError {
    ReactiveError::InvalidKey {
        key: format!("length = {len}"),
        kind: TargetKind::Array.as_str(),
    }
}

fn array_key(key: &Value) -> Result<ArrayKey, ReactiveError> {
    if key.as_str() == Some("length") {
        return Ok(ArrayKey::Length);
    }
    as_index(key)
        .map(ArrayKey::Index)
        .ok_or_else(|| ReactiveError::InvalidKey {
            key: key_label(key),
            kind: TargetKind::Array.as_str(),
        })
}

fn read_fields<R>(target: &Target, f: impl FnOnce(&IndexMap<String, Value>) -> R) -> R {
    target.with(|container| match container {
        Container::Object(fields) => f(fields),
        _ => f(&IndexMap::new()),
    })
}

fn read_items<R>(target: &Target, f: impl FnOnce(&[Value]) -> R) -> R {
    target.with(|container| match container {
        Container::Array(items) => f(items),
        _ => f(&[]),
    })
}

impl Proxy {
    /// Read a property, index or map entry.
    ///
    /// Objects take string (or number) keys, arrays take indices and
    /// `"length"`, maps take any value. Missing entries read as `None`.
    pub fn get(&self, key: impl Into<Value>) -> Result<Option<Value>, ReactiveError> {
        let key = key.into();
        if let Some(delegate) = self.delegate() {
            return Ok(delegate.get(key)?.map(|value| self.wrap_nested(value)));
        }

        let value = match self.kind() {
            TargetKind::Object => {
                let name = to_property_key(&key)?;
                self.track(DepKey::Value(Key::String(name.clone())));
                self.target().get(&name)
            }
            TargetKind::Array => match array_key(&key)? {
                ArrayKey::Length => {
                    self.track(DepKey::Length);
                    return Ok(Some(Value::from(self.target().len())));
                }
                ArrayKey::Index(index) => {
                    self.track(DepKey::Value(Key::index(index)));
                    read_items(self.target(), |items| items.get(index).cloned())
                }
            },
            TargetKind::Map | TargetKind::WeakMap => collections::get(self, &key)?,
            kind => return Err(unsupported("get", kind)),
        };
        Ok(value.map(|value| self.wrap_nested(value)))
    }

    /// Write a property, index or map entry.
    ///
    /// Deep wrappers store the raw form of wrapped values. Writing an
    /// array's `"length"` resizes it.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<(), ReactiveError> {
        let key = key.into();
        self.check_writable(key_label(&key))?;
        let value = self.stored(value.into());

        match self.kind() {
            TargetKind::Object => {
                let name = to_property_key(&key)?;
                let stored = value.clone();
                let previous = self.target().write(&name, |container| match container {
                    Container::Object(fields) => Some(fields.insert(name.clone(), stored)),
                    _ => None,
                })?;
                let key = Key::String(name);
                match previous {
                    Some(None) => tracking::trigger(self.target(), TriggerOp::Add, Some(&key)),
                    Some(Some(old)) if !same_value(&old, &value) => {
                        tracking::trigger(self.target(), TriggerOp::Set, Some(&key))
                    }
                    _ => {}
                }
                Ok(())
            }
            TargetKind::Array => match array_key(&key)? {
                ArrayKey::Length => {
                    let len = as_length(&value).ok_or_else(|| length_error(key_label(&value)))?;
                    self.set_len(len)
                }
                ArrayKey::Index(index) => {
                    let len = index
                        .checked_add(1)
                        .filter(|&len| len <= MAX_ARRAY_LEN)
                        .ok_or_else(|| length_error(index))?;
                    self.mutate_array("set", Span::At(index), |items| {
                        if index >= items.len() {
                            items.resize(len, Value::Null);
                        }
                        items[index] = value;
                    })
                }
            },
            TargetKind::Map | TargetKind::WeakMap => collections::set(self, key, value),
            kind => Err(unsupported("set", kind)),
        }
    }

    /// Remove a property or entry. Returns whether it existed.
    ///
    /// Arrays do not support holes; use [`remove`](Self::remove).
    pub fn delete(&self, key: impl Into<Value>) -> Result<bool, ReactiveError> {
        let key = key.into();
        self.check_writable(key_label(&key))?;

        match self.kind() {
            TargetKind::Object => {
                let name = to_property_key(&key)?;
                let removed = self.target().remove(&name)?;
                let existed = removed.is_some();
                drop(removed);
                if existed {
                    tracking::trigger(self.target(), TriggerOp::Delete, Some(&Key::String(name)));
                }
                Ok(existed)
            }
            TargetKind::Array => Err(unsupported("delete", TargetKind::Array)),
            _ => collections::delete(self, &key),
        }
    }

    /// Whether a property, index or entry exists. Tracks presence only.
    pub fn has(&self, key: impl Into<Value>) -> Result<bool, ReactiveError> {
        let key = key.into();
        if let Some(delegate) = self.delegate() {
            return delegate.has(key);
        }

        match self.kind() {
            TargetKind::Object => {
                let name = to_property_key(&key)?;
                self.track(DepKey::Has(Key::String(name.clone())));
                Ok(read_fields(self.target(), |fields| fields.contains_key(&name)))
            }
            TargetKind::Array => match array_key(&key)? {
                ArrayKey::Length => Ok(true),
                ArrayKey::Index(index) => {
                    self.track(DepKey::Has(Key::index(index)));
                    Ok(index < self.target().len())
                }
            },
            _ => collections::has(self, &key),
        }
    }

    /// Own keys: property names, array indices, map keys or set members.
    pub fn keys(&self) -> Result<Vec<Value>, ReactiveError> {
        if let Some(delegate) = self.delegate() {
            return Ok(self.wrap_all(delegate.keys()?));
        }

        match self.kind() {
            TargetKind::Object => {
                self.track(DepKey::Iterate);
                Ok(read_fields(self.target(), |fields| {
                    fields.keys().map(|name| Value::from(name.as_str())).collect()
                }))
            }
            TargetKind::Array => {
                self.track(DepKey::Length);
                Ok((0..self.target().len()).map(Value::from).collect())
            }
            _ => collections::keys(self),
        }
    }

    /// Values in iteration order, wrapped according to the mode.
    pub fn values(&self) -> Result<Vec<Value>, ReactiveError> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    /// `(key, value)` pairs in iteration order.
    ///
    /// Objects and arrays also track every key read, so reassigning any
    /// value re-runs the reader. Sets yield each member as both key and value.
    pub fn entries(&self) -> Result<Vec<(Value, Value)>, ReactiveError> {
        if let Some(delegate) = self.delegate() {
            return Ok(delegate
                .entries()?
                .into_iter()
                .map(|(key, value)| (self.wrap_nested(key), self.wrap_nested(value)))
                .collect());
        }

        let entries: Vec<(Value, Value)> = match self.kind() {
            TargetKind::Object => {
                self.track(DepKey::Iterate);
                let fields: Vec<(String, Value)> = read_fields(self.target(), |fields| {
                    fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                });
                fields
                    .into_iter()
                    .map(|(name, value)| {
                        self.track(DepKey::Value(Key::String(name.clone())));
                        (Value::from(name), value)
                    })
                    .collect()
            }
            TargetKind::Array => {
                self.track(DepKey::Length);
                let items: Vec<Value> = read_items(self.target(), |items| items.to_vec());
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, value)| {
                        self.track(DepKey::Value(Key::index(index)));
                        (Value::from(index), value)
                    })
                    .collect()
            }
            _ => return collections::entries(self),
        };
        Ok(entries
            .into_iter()
            .map(|(key, value)| (key, self.wrap_nested(value)))
            .collect())
    }

    /// Number of properties, items or entries.
    pub fn len(&self) -> Result<usize, ReactiveError> {
        if let Some(delegate) = self.delegate() {
            return delegate.len();
        }

        match self.kind() {
            TargetKind::Object => {
                self.track(DepKey::Iterate);
                Ok(self.target().len())
            }
            TargetKind::Array => {
                self.track(DepKey::Length);
                Ok(self.target().len())
            }
            _ => collections::len(self),
        }
    }

    pub fn is_empty(&self) -> Result<bool, ReactiveError> {
        Ok(self.len()? == 0)
    }

    /// Call `f` with every `(key, value)` pair.
    pub fn for_each(&self, mut f: impl FnMut(Value, Value)) -> Result<(), ReactiveError> {
        for (key, value) in self.entries()? {
            f(key, value);
        }
        Ok(())
    }

    /// Write several entries at once. Effects observe only the final state.
    ///
    /// Stops at the first failing write; earlier writes stay applied.
    pub fn assign<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<(), ReactiveError>
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        batch(|| {
            for (key, value) in entries {
                self.set(key, value)?;
            }
            Ok::<(), ReactiveError>(())
        })
    }

    // ---- arrays ----

    /// Append to an array. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize, ReactiveError> {
        let value = self.stored(value.into());
        self.mutate_array("push", Span::End, |items| {
            if items.len() >= MAX_ARRAY_LEN {
                return Err(length_error(items.len() + 1));
            }
            items.push(value);
            Ok(items.len())
        })?
    }

    /// Remove and return the last item of an array.
    pub fn pop(&self) -> Result<Option<Value>, ReactiveError> {
        let popped = self.mutate_array("pop", Span::End, Vec::pop)?;
        Ok(popped.map(|value| self.wrap_nested(value)))
    }

    /// Insert into an array at `index`, shifting later items.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<(), ReactiveError> {
        let value = self.stored(value.into());
        self.mutate_array("insert", Span::From(index), |items| {
            (index <= items.len() && items.len() < MAX_ARRAY_LEN)
                .then(|| items.insert(index, value))
        })?
        .ok_or_else(|| ReactiveError::InvalidKey {
            key: index.to_string(),
            kind: TargetKind::Array.as_str(),
        })
    }

    /// Remove the item at `index`, shifting later items.
    pub fn remove(&self, index: usize) -> Result<Value, ReactiveError> {
        let removed = self.mutate_array("remove", Span::From(index), |items| {
            (index < items.len()).then(|| items.remove(index))
        })?;
        removed
            .map(|value| self.wrap_nested(value))
            .ok_or_else(|| ReactiveError::InvalidKey {
                key: index.to_string(),
                kind: TargetKind::Array.as_str(),
            })
    }

    /// Shorten an array to `len` items. Longer arrays are left alone.
    pub fn truncate(&self, len: usize) -> Result<(), ReactiveError> {
        self.mutate_array("truncate", Span::End, |items| items.truncate(len))
    }

    /// Resize an array, padding with `Null`.
    ///
    /// Lengths past `u32::MAX` are rejected.
    pub fn set_len(&self, len: usize) -> Result<(), ReactiveError> {
        if len > MAX_ARRAY_LEN {
            return Err(length_error(len));
        }
        self.mutate_array("length", Span::End, |items| items.resize(len, Value::Null))
    }

    // ---- helpers ----

    /// The form a written value is stored in.
    fn stored(&self, value: Value) -> Value {
        if self.is_shallow() || is_readonly(&value) {
            value
        } else {
            to_raw(&value)
        }
    }

    fn wrap_all(&self, values: Vec<Value>) -> Vec<Value> {
        values
            .into_iter()
            .map(|value| self.wrap_nested(value))
            .collect()
    }

    /// Apply `f` to the raw items and trigger whatever it changed.
    ///
    /// Only slots inside `span` are compared for in-place changes; growth
    /// and shrinkage are read off the length.
    fn mutate_array<R>(
        &self,
        operation: &'static str,
        span: Span,
        f: impl FnOnce(&mut Vec<Value>) -> R,
    ) -> Result<R, ReactiveError> {
        self.check_writable(operation)?;
        let kind = self.kind();

        let (old_len, new_len, changed, result) =
            self.target().write(operation, |container| match container {
                Container::Array(items) => {
                    let old_len = items.len();
                    let range = span.range(old_len);
                    let before: Vec<Value> = items[range.clone()].to_vec();
                    let result = f(items);
                    let changed: SmallVec<[usize; 8]> = range
                        .zip(&before)
                        .filter(|&(index, old)| {
                            items.get(index).is_some_and(|new| !same_value(old, new))
                        })
                        .map(|(index, _)| index)
                        .collect();
                    Ok((old_len, items.len(), changed, result))
                }
                _ => Err(unsupported(operation, kind)),
            })??;

        let target = self.target();
        batch(|| {
            for index in changed {
                tracking::trigger(target, TriggerOp::Set, Some(&Key::index(index)));
            }
            for index in old_len..new_len {
                tracking::trigger(target, TriggerOp::Add, Some(&Key::index(index)));
            }
            if new_len < old_len {
                tracking::trigger_length(target, new_len);
            }
        });
        Ok(result)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
