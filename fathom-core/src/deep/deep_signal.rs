//! Deep Signals
//!
//! A [`DeepSignal`] is a cell whose value is kept deep-reactive: any object
//! assigned to it is wrapped on the way in, so readers see both replacements
//! of the whole value and mutations inside it.

use super::reactivity::to_deep_reactive;
use super::value::{same_value, Value};
use crate::graph::NodeId;
use crate::reactive::{Signal, Subscription};

/// A cell holding a deep-reactive [`Value`].
///
/// ```
/// use fathom_core::deep::{deep_signal, Target, Value};
///
/// let state = deep_signal(Target::object());
/// let proxy = state.get().into_proxy().unwrap();
/// proxy.set("ready", true).unwrap();
/// assert_eq!(state.peek().as_proxy().unwrap().get("ready").unwrap(), Some(Value::from(true)));
/// ```
#[derive(Clone, Debug)]
pub struct DeepSignal {
    signal: Signal<Value>,
}

impl DeepSignal {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            signal: Signal::new_with_equals(to_deep_reactive(value), same_value),
        }
    }

    pub fn id(&self) -> NodeId {
        self.signal.id()
    }

    /// Tracked read.
    pub fn get(&self) -> Value {
        self.signal.get()
    }

    pub fn peek(&self) -> Value {
        self.signal.peek()
    }

    /// Replace the value. Objects are wrapped first, so assigning the raw
    /// target of the current value is not a change.
    pub fn set(&self, value: impl Into<Value>) {
        self.signal.set(to_deep_reactive(value));
    }

    pub fn update(&self, f: impl FnOnce(&Value) -> Value) {
        let next = f(&self.signal.peek());
        self.set(next);
    }

    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Value) + Send + 'static,
    {
        self.signal.subscribe(f)
    }

    /// The underlying cell.
    pub fn signal(&self) -> &Signal<Value> {
        &self.signal
    }
}

/// Create a [`DeepSignal`].
pub fn deep_signal(value: impl Into<Value>) -> DeepSignal {
    DeepSignal::new(value)
}
