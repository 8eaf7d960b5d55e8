//! Integration Tests for Reactive System
//!
//! These tests verify that cells, derived cells, and effects work together
//! correctly through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use fathom_core::reactive::{Cleanup, ReactiveContext};
use fathom_core::{batch, cell, derived, effect, reaction, untracked, Memo, ReactionOptions, Signal};

/// A derived cell doubles a cell and follows its changes.
#[test]
fn derived_cell_follows_cell() {
    let c = cell(1);
    let d = {
        let c = c.clone();
        derived(move || c.get() * 2)
    };
    assert_eq!(d.get(), 2);

    c.set(5);
    assert_eq!(d.get(), 10);
}

/// An effect over a deep-reactive store sees every write.
#[test]
fn effect_over_store_sees_each_write() {
    use fathom_core::deep::{deep_reactive, Target, Value};

    let store = deep_reactive(Target::object_from([("count", Value::from(0))]))
        .into_proxy()
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let fx = {
        let (store, seen) = (store.clone(), seen.clone());
        effect(move || {
            let count = store.get("count").unwrap().and_then(|v| v.as_i64());
            seen.lock().push(count.unwrap_or(-1));
        })
    };

    store.set("count", 1).unwrap();
    store.set("count", 2).unwrap();
    assert_eq!(*seen.lock(), vec![0, 1, 2]);
    fx.dispose();
}

/// Reading a cell subscribes exactly once; not reading it subscribes never.
#[test]
fn reads_decide_reevaluation() {
    let read = Signal::new(1);
    let ignored = Signal::new(1);
    let runs = Arc::new(AtomicI32::new(0));
    let computes = Arc::new(AtomicI32::new(0));

    let fx = {
        let (read, runs) = (read.clone(), runs.clone());
        effect(move || {
            read.get();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };
    let memo = {
        let (read, computes) = (read.clone(), computes.clone());
        Memo::new(move || {
            computes.fetch_add(1, Ordering::SeqCst);
            read.get() + 1
        })
    };
    assert_eq!(memo.get(), 2);

    ignored.set(2);
    ignored.set(3);
    assert_eq!(memo.get(), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(computes.load(Ordering::SeqCst), 1);

    read.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(memo.get(), 3);
    assert_eq!(memo.get(), 3);
    assert_eq!(computes.load(Ordering::SeqCst), 2);

    // same value: no change
    read.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    fx.dispose();
}

/// N writes in one batch run the effect once, with the final values.
#[test]
fn batch_coalesces_writes() {
    let cells: Vec<Signal<i32>> = (0..8).map(Signal::new).collect();
    let runs = Arc::new(AtomicI32::new(0));
    let sum = Arc::new(AtomicI32::new(0));

    let fx = {
        let (cells, runs, sum) = (cells.clone(), runs.clone(), sum.clone());
        effect(move || {
            let total: i32 = cells.iter().map(Signal::get).sum();
            sum.store(total, Ordering::SeqCst);
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    batch(|| {
        for (i, c) in cells.iter().enumerate() {
            c.set(100 + i as i32);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(sum.load(Ordering::SeqCst), (100..108).sum::<i32>());
    fx.dispose();
}

/// A diamond re-runs its effect once per source change.
#[test]
fn diamond_runs_effect_once() {
    let a = Signal::new(1);
    let b = {
        let a = a.clone();
        derived(move || a.get() + 1)
    };
    let c = {
        let a = a.clone();
        derived(move || a.get() * 10)
    };
    let seen = Arc::new(Mutex::new(Vec::new()));

    let fx = {
        let (b, c, seen) = (b.clone(), c.clone(), seen.clone());
        effect(move || seen.lock().push(b.get() + c.get()))
    };
    a.set(2);
    assert_eq!(*seen.lock(), vec![12, 23]);
    fx.dispose();
}

/// A derived cell that keeps its value stops propagation.
#[test]
fn unchanged_derived_value_short_circuits() {
    let n = Signal::new(2);
    let parity = {
        let n = n.clone();
        derived(move || n.get() % 2)
    };
    let runs = Arc::new(AtomicI32::new(0));

    let fx = {
        let (parity, runs) = (parity.clone(), runs.clone());
        effect(move || {
            parity.get();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };
    n.set(4);
    n.set(6);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    n.set(7);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    fx.dispose();
}

/// Cleanups run before each re-run and on disposal.
#[test]
fn cleanup_runs_before_rerun_and_on_dispose() {
    let s = Signal::new(0);
    let cleanups = Arc::new(AtomicI32::new(0));

    let fx = {
        let (s, cleanups) = (s.clone(), cleanups.clone());
        effect(move || {
            s.get();
            let cleanups = cleanups.clone();
            Cleanup::new(move || {
                cleanups.fetch_add(1, Ordering::SeqCst);
            })
        })
    };
    s.set(1);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);

    fx.dispose();
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);

    s.set(2);
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
}

/// Untracked reads register nothing.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = Signal::new(0);
    let hidden = Signal::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    let fx = {
        let (tracked, hidden, runs) = (tracked.clone(), hidden.clone(), runs.clone());
        effect(move || {
            tracked.get();
            untracked(|| hidden.get());
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };
    assert_eq!(fx.dependency_count(), 1);

    hidden.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    tracked.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    fx.dispose();
}

/// Dependencies are replaced by what the latest run read.
#[test]
fn dynamic_dependencies_are_replaced() {
    let flag = Signal::new(true);
    let left = Signal::new(1);
    let right = Signal::new(2);
    let runs = Arc::new(AtomicI32::new(0));

    let fx = {
        let (flag, left, right, runs) = (flag.clone(), left.clone(), right.clone(), runs.clone());
        effect(move || {
            if flag.get() {
                left.get();
            } else {
                right.get();
            }
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    right.set(3);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    flag.set(false);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    left.set(5);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    right.set(4);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    fx.dispose();
}

/// Reactions track only their dependency function.
#[test]
fn reaction_receives_dependency_value() {
    let a = Signal::new(1);
    let other = Signal::new(0);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let fx = {
        let (a, other, seen) = (a.clone(), other.clone(), seen.clone());
        reaction(
            move || a.get(),
            move |value, run| {
                other.get();
                seen.lock().push((value, run.is_first));
            },
            ReactionOptions::default(),
        )
    };
    other.set(1);
    a.set(2);
    assert_eq!(*seen.lock(), vec![(1, true), (2, false)]);
    fx.dispose();
}

/// Nested tracking frames keep their own subscriber.
#[test]
fn nested_reactive_contexts() {
    assert!(ReactiveContext::current_subscriber().is_none());
    let outer = Signal::new(0);
    let inner = Signal::new(0);
    let outer_runs = Arc::new(AtomicI32::new(0));

    let fx = {
        let (outer, inner, outer_runs) = (outer.clone(), inner.clone(), outer_runs.clone());
        effect(move || {
            outer.get();
            let inner = inner.clone();
            let nested = Memo::new(move || inner.get());
            untracked(|| nested.get());
            outer_runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    inner.set(1);
    assert_eq!(outer_runs.load(Ordering::SeqCst), 1);
    outer.set(1);
    assert_eq!(outer_runs.load(Ordering::SeqCst), 2);
    fx.dispose();
}
