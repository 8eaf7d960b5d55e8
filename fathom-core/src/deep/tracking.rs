//! Track / Trigger
//!
//! Raw targets are not part of the dependency graph themselves. Instead each
//! observed `(target, key)` pair gets an invalidation cell: a plain
//! [`Signal`] whose value is meaningless and only ever bumped. Reading a
//! wrapped property reads the cell ([`track`]); writing one bumps the cells
//! the write can affect ([`trigger`]).
//!
//! # How Triggering Works
//!
//! A write names an operation ([`TriggerOp`]) and a key. Besides the key's
//! own value cell, some operations also invalidate synthetic keys that no
//! computation reads directly, such as the iteration cell behind `keys()`.
//! Which ones is decided by a single table, [`affected`], per operation and
//! container kind:
//!
//! | op     | object              | array                  | map                                | set            |
//! |--------|---------------------|------------------------|------------------------------------|----------------|
//! | Set    | value               | value                  | value, iterate                     |                |
//! | Add    | value, has, iterate | value, has, length     | value, has, iterate, key-iterate   | has, iterate   |
//! | Delete | value, has, iterate | value, has             | value, has, iterate, key-iterate   | has, iterate   |
//! | Clear  | every cell          | every cell             | every cell                         | every cell     |
//!
//! Weak maps behave like maps and weak sets like sets, minus iteration.
//! Array shrinking goes through [`trigger_length`], which also reaches every
//! index at or past the new length.
//!
//! All cells of one trigger are bumped inside one batch, so an effect that
//! reads several of them runs once.

use std::collections::HashMap;
use std::sync::OnceLock;

use dashmap::DashMap;
use smallvec::{smallvec, SmallVec};

use super::target::{Target, TargetId, TargetKind};
use super::value::Key;
use crate::reactive::{batch, Runtime, Signal};

/// What a tracked read depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// The value stored under a key.
    Value(Key),
    /// Whether a key is present, independent of its value.
    Has(Key),
    /// An array's length.
    Length,
    /// The set of keys (objects, sets) or of entries (maps).
    Iterate,
    /// The set of keys of a map, independent of its values.
    KeyIterate,
}

/// The kind of write being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerOp {
    /// A key that did not exist was created.
    Add,
    /// An existing key got a different value.
    Set,
    Delete,
    /// Every entry was removed.
    Clear,
}

type Cells = HashMap<DepKey, Signal<u64>>;

static CELLS: OnceLock<DashMap<TargetId, Cells>> = OnceLock::new();

fn cells() -> &'static DashMap<TargetId, Cells> {
    CELLS.get_or_init(DashMap::new)
}

/// Record that the running computation depends on `key` of `target`.
///
/// Outside a computation this does nothing and allocates nothing.
pub fn track(target: &Target, key: DepKey) {
    if !Runtime::is_tracking() {
        return;
    }
    let cell = {
        let mut entry = cells().entry(target.id()).or_default();
        entry
            .entry(key.clone())
            .or_insert_with(|| Signal::new(0))
            .clone()
    };
    tracing::trace!(target = %target.id(), ?key, "track");
    cell.get();
}

/// Report a write to `key` of `target`.
///
/// `key` may be `None` only for [`TriggerOp::Clear`].
pub fn trigger(target: &Target, op: TriggerOp, key: Option<&Key>) {
    let affected_cells: SmallVec<[Signal<u64>; 4]> = {
        let Some(entry) = cells().get(&target.id()) else {
            return;
        };
        if op == TriggerOp::Clear {
            entry.values().cloned().collect()
        } else {
            affected(target.kind(), op, key)
                .iter()
                .filter_map(|dep| entry.get(dep).cloned())
                .collect()
        }
    };

    tracing::trace!(target = %target.id(), ?op, ?key, cells = affected_cells.len(), "trigger");
    bump(&affected_cells);
}

/// Report that an array now has `new_len` items and used to have more.
pub fn trigger_length(target: &Target, new_len: usize) {
    let affected_cells: SmallVec<[Signal<u64>; 4]> = {
        let Some(entry) = cells().get(&target.id()) else {
            return;
        };
        entry
            .iter()
            .filter(|(dep, _)| match dep {
                DepKey::Length => true,
                DepKey::Value(key) | DepKey::Has(key) => {
                    key.as_index().is_some_and(|index| index >= new_len)
                }
                _ => false,
            })
            .map(|(_, cell)| cell.clone())
            .collect()
    };

    tracing::trace!(target = %target.id(), new_len, cells = affected_cells.len(), "trigger length");
    bump(&affected_cells);
}

fn bump(affected_cells: &[Signal<u64>]) {
    if affected_cells.is_empty() {
        return;
    }
    batch(|| {
        for cell in affected_cells {
            cell.update(|n| n.wrapping_add(1));
        }
    });
}

/// The cells a non-clear write invalidates.
fn affected(kind: TargetKind, op: TriggerOp, key: Option<&Key>) -> SmallVec<[DepKey; 4]> {
    use DepKey::*;

    let mut deps: SmallVec<[DepKey; 4]> = smallvec![];
    let value = |deps: &mut SmallVec<[DepKey; 4]>| {
        if let Some(key) = key {
            deps.push(Value(key.clone()));
        }
    };
    let has = |deps: &mut SmallVec<[DepKey; 4]>| {
        if let Some(key) = key {
            deps.push(Has(key.clone()));
        }
    };

    match (kind, op) {
        (_, TriggerOp::Clear) => {}

        (TargetKind::Object, TriggerOp::Set) => value(&mut deps),
        (TargetKind::Object, TriggerOp::Add | TriggerOp::Delete) => {
            value(&mut deps);
            has(&mut deps);
            deps.push(Iterate);
        }

        (TargetKind::Array, TriggerOp::Set | TriggerOp::Delete) => {
            value(&mut deps);
            if op == TriggerOp::Delete {
                has(&mut deps);
            }
        }
        (TargetKind::Array, TriggerOp::Add) => {
            value(&mut deps);
            has(&mut deps);
            deps.push(Length);
        }

        (TargetKind::Map, TriggerOp::Set) => {
            value(&mut deps);
            deps.push(Iterate);
        }
        (TargetKind::Map, TriggerOp::Add | TriggerOp::Delete) => {
            value(&mut deps);
            has(&mut deps);
            deps.push(Iterate);
            deps.push(KeyIterate);
        }

        (TargetKind::Set, TriggerOp::Set) => {}
        (TargetKind::Set, TriggerOp::Add | TriggerOp::Delete) => {
            has(&mut deps);
            deps.push(Iterate);
        }

        (TargetKind::WeakMap, TriggerOp::Set) => value(&mut deps),
        (TargetKind::WeakMap, TriggerOp::Add | TriggerOp::Delete) => {
            value(&mut deps);
            has(&mut deps);
        }

        (TargetKind::WeakSet, TriggerOp::Set) => {}
        (TargetKind::WeakSet, TriggerOp::Add | TriggerOp::Delete) => has(&mut deps),
    }
    deps
}

/// Number of invalidation cells allocated for a target.
pub fn cell_count(target: TargetId) -> usize {
    cells().get(&target).map_or(0, |entry| entry.len())
}

/// Drop every cell of a target. Called when the target is freed.
pub(crate) fn forget(target: TargetId) {
    let removed = cells().remove(&target);
    // Dropped outside the shard lock: dropping a cell removes its graph node.
    drop(removed);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
