//! Collection Operations
//!
//! Maps, sets, weak maps and weak sets are observed through their methods
//! rather than through properties. Keys are compared with `SameValueZero`
//! and always stored raw, so a wrapper and its target address the same entry.
//!
//! Weak collections only accept objects as keys and never keep them alive.
//! Entries whose key was freed are invisible and are purged on the next write.

use std::collections::HashMap;
use std::mem;

use super::handlers::{key_label, unsupported};
use super::reactivity::{to_raw, Proxy};
use super::target::{Container, TargetId, TargetKind, WeakTarget};
use super::tracking::{self, DepKey, TriggerOp};
use super::value::{same_value, Key, Value};
use crate::error::ReactiveError;

fn weak_key(key: &Value) -> Option<(TargetId, WeakTarget)> {
    key.raw_target().map(|target| (target.id(), target.downgrade()))
}

fn invalid_weak_key(key: &Value, kind: TargetKind) -> ReactiveError {
    ReactiveError::InvalidKey {
        key: key_label(key),
        kind: kind.as_str(),
    }
}

pub(super) fn get(proxy: &Proxy, key: &Value) -> Result<Option<Value>, ReactiveError> {
    match proxy.kind() {
        TargetKind::Map => {
            let key = Key::of(key);
            proxy.track(DepKey::Value(key.clone()));
            Ok(proxy.target().with(|container| match container {
                Container::Map(entries) => entries.get(&key).map(|(_, value)| value.clone()),
                _ => None,
            }))
        }
        TargetKind::WeakMap => {
            let Some((id, _)) = weak_key(key) else {
                return Ok(None);
            };
            proxy.track(DepKey::Value(Key::Object(id)));
            Ok(proxy.target().with(|container| match container {
                Container::WeakMap(entries) => entries
                    .get(&id)
                    .filter(|(key, _)| key.is_alive())
                    .map(|(_, value)| value.clone()),
                _ => None,
            }))
        }
        kind => Err(unsupported("get", kind)),
    }
}

pub(super) fn set(proxy: &Proxy, key: Value, value: Value) -> Result<(), ReactiveError> {
    let kind = proxy.kind();
    let label = key_label(&key);

    let (trigger_key, previous) = match kind {
        TargetKind::Map => {
            let key = to_raw(&key);
            let identity = Key::of(&key);
            let stored = value.clone();
            let previous = proxy.target().write(&label, |container| match container {
                Container::Map(entries) => match entries.get_mut(&identity) {
                    Some(entry) => Some(mem::replace(&mut entry.1, stored)),
                    None => {
                        entries.insert(identity.clone(), (key, stored));
                        None
                    }
                },
                _ => None,
            })?;
            (identity, previous)
        }
        TargetKind::WeakMap => {
            let (id, weak) = weak_key(&key).ok_or_else(|| invalid_weak_key(&key, kind))?;
            let stored = value.clone();
            let (previous, purged) = proxy.target().write(&label, |container| match container {
                Container::WeakMap(entries) => {
                    let purged = purge_dead(entries, |(key, _)| key.is_alive());
                    let previous = entries.insert(id, (weak, stored)).map(|(_, value)| value);
                    (previous, purged)
                }
                _ => (None, Vec::new()),
            })?;
            drop(purged);
            (Key::Object(id), previous)
        }
        kind => return Err(unsupported("set", kind)),
    };

    match previous {
        None => tracking::trigger(proxy.target(), TriggerOp::Add, Some(&trigger_key)),
        Some(old) if !same_value(&old, &value) => {
            tracking::trigger(proxy.target(), TriggerOp::Set, Some(&trigger_key))
        }
        Some(_) => {}
    }
    Ok(())
}

pub(super) fn delete(proxy: &Proxy, key: &Value) -> Result<bool, ReactiveError> {
    let kind = proxy.kind();
    let label = key_label(key);

    let identity = match kind {
        TargetKind::Map | TargetKind::Set => Key::of(key),
        TargetKind::WeakMap | TargetKind::WeakSet => match weak_key(key) {
            Some((id, _)) => Key::Object(id),
            None => return Ok(false),
        },
        kind => return Err(unsupported("delete", kind)),
    };

    let removed = proxy.target().write(&label, |container| match container {
        Container::Map(entries) => entries.shift_remove(&identity).map(|_| ()),
        Container::Set(items) => items.shift_remove(&identity).map(|_| ()),
        Container::WeakMap(entries) => match &identity {
            Key::Object(id) => entries.remove(id).map(|_| ()),
            _ => None,
        },
        Container::WeakSet(items) => match &identity {
            Key::Object(id) => items.remove(id).map(|_| ()),
            _ => None,
        },
        _ => None,
    })?;

    let existed = removed.is_some();
    if existed {
        tracking::trigger(proxy.target(), TriggerOp::Delete, Some(&identity));
    }
    Ok(existed)
}

pub(super) fn has(proxy: &Proxy, key: &Value) -> Result<bool, ReactiveError> {
    match proxy.kind() {
        TargetKind::Map | TargetKind::Set => {
            let key = Key::of(key);
            proxy.track(DepKey::Has(key.clone()));
            Ok(proxy.target().with(|container| match container {
                Container::Map(entries) => entries.contains_key(&key),
                Container::Set(items) => items.contains_key(&key),
                _ => false,
            }))
        }
        TargetKind::WeakMap | TargetKind::WeakSet => {
            let Some((id, _)) = weak_key(key) else {
                return Ok(false);
            };
            proxy.track(DepKey::Has(Key::Object(id)));
            Ok(proxy.target().with(|container| match container {
                Container::WeakMap(entries) => entries.get(&id).is_some_and(|(k, _)| k.is_alive()),
                Container::WeakSet(items) => items.get(&id).is_some_and(WeakTarget::is_alive),
                _ => false,
            }))
        }
        kind => Err(unsupported("has", kind)),
    }
}

pub(super) fn len(proxy: &Proxy) -> Result<usize, ReactiveError> {
    match proxy.kind() {
        TargetKind::Map | TargetKind::Set => {
            proxy.track(DepKey::Iterate);
            Ok(proxy.target().len())
        }
        kind => Err(unsupported("size", kind)),
    }
}

pub(super) fn keys(proxy: &Proxy) -> Result<Vec<Value>, ReactiveError> {
    let keys: Vec<Value> = match proxy.kind() {
        TargetKind::Map => {
            proxy.track(DepKey::KeyIterate);
            proxy.target().with(|container| match container {
                Container::Map(entries) => entries.values().map(|(key, _)| key.clone()).collect(),
                _ => Vec::new(),
            })
        }
        TargetKind::Set => {
            proxy.track(DepKey::Iterate);
            proxy.target().with(|container| match container {
                Container::Set(items) => items.values().cloned().collect(),
                _ => Vec::new(),
            })
        }
        kind => return Err(unsupported("keys", kind)),
    };
    Ok(keys
        .into_iter()
        .map(|key| proxy.wrap_nested(key))
        .collect())
}

pub(super) fn entries(proxy: &Proxy) -> Result<Vec<(Value, Value)>, ReactiveError> {
    let entries: Vec<(Value, Value)> = match proxy.kind() {
        TargetKind::Map | TargetKind::Set => {
            proxy.track(DepKey::Iterate);
            proxy.target().with(|container| match container {
                Container::Map(entries) => entries.values().cloned().collect(),
                Container::Set(items) => items.values().map(|v| (v.clone(), v.clone())).collect(),
                _ => Vec::new(),
            })
        }
        kind => return Err(unsupported("entries", kind)),
    };
    Ok(entries
        .into_iter()
        .map(|(key, value)| (proxy.wrap_nested(key), proxy.wrap_nested(value)))
        .collect())
}

/// Remove entries whose key was freed, handing them back to be dropped
/// outside the lock.
fn purge_dead<V>(entries: &mut HashMap<TargetId, V>, alive: impl Fn(&V) -> bool) -> Vec<V> {
    let dead: Vec<TargetId> = entries
        .iter()
        .filter(|(_, entry)| !alive(entry))
        .map(|(id, _)| *id)
        .collect();
    dead.into_iter()
        .filter_map(|id| entries.remove(&id))
        .collect()
}

impl Proxy {
    /// Add a member to a set or weak set. Returns whether it was new.
    pub fn add(&self, value: impl Into<Value>) -> Result<bool, ReactiveError> {
        let value = value.into();
        let label = key_label(&value);
        self.check_writable(&label)?;
        let kind = self.kind();

        let identity = match kind {
            TargetKind::Set => {
                let value = to_raw(&value);
                let identity = Key::of(&value);
                let added = self.target().write(&label, |container| match container {
                    Container::Set(items) if !items.contains_key(&identity) => {
                        items.insert(identity.clone(), value);
                        true
                    }
                    _ => false,
                })?;
                added.then_some(identity)
            }
            TargetKind::WeakSet => {
                let (id, weak) =
                    weak_key(&value).ok_or_else(|| invalid_weak_key(&value, kind))?;
                let (added, purged) = self.target().write(&label, |container| match container {
                    Container::WeakSet(items) => {
                        let purged = purge_dead(items, WeakTarget::is_alive);
                        (items.insert(id, weak).is_none(), purged)
                    }
                    _ => (false, Vec::new()),
                })?;
                drop(purged);
                added.then_some(Key::Object(id))
            }
            kind => return Err(unsupported("add", kind)),
        };

        match identity {
            Some(identity) => {
                tracking::trigger(self.target(), TriggerOp::Add, Some(&identity));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every entry of a map or set.
    pub fn clear(&self) -> Result<(), ReactiveError> {
        self.check_writable("clear")?;
        let kind = self.kind();

        let removed = self.target().write("clear", |container| match container {
            Container::Map(entries) => Ok(!mem::take(entries).is_empty()),
            Container::Set(items) => Ok(!mem::take(items).is_empty()),
            _ => Err(unsupported("clear", kind)),
        })??;

        if removed {
            tracking::trigger(self.target(), TriggerOp::Clear, None);
        }
        Ok(())
    }

    /// Number of entries of a map or set.
    pub fn size(&self) -> Result<usize, ReactiveError> {
        self.len()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
