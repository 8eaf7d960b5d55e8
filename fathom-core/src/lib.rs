//! Fathom Core
//!
//! This crate provides a fine-grained reactive state engine. It implements:
//!
//! - Reactive primitives (cells, derived cells, effects, batching)
//! - Deep reactivity over nested objects, arrays and collections
//! - Resources: cancellable, source-driven asynchronous values
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node states, versions and the update scheduler
//! - `reactive`: signals, memos, effects and the runtime that links them
//! - `deep`: the interception layer that makes plain data reactive
//! - `resource`: the fetch state machine built on the primitives above
//! - `config` and `error`: runtime settings and error types
//!
//! # Example
//!
//! ```rust
//! use fathom_core::{derived, effect, cell};
//!
//! // Create a cell
//! let count = cell(1);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     derived(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! let logger = {
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     effect(move || {
//!         println!("Count: {}, Doubled: {}", count.get(), doubled.get());
//!     })
//! };
//!
//! // Update the cell
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! assert_eq!(doubled.get(), 10);
//! logger.dispose();
//! ```

pub mod config;
pub mod deep;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod resource;

pub use config::RuntimeConfig;
pub use error::{BoxError, ReactiveError, ResourceError};
pub use reactive::{
    batch, cell, derived, effect, reaction, untracked, Cleanup, Effect, Memo, ReactionOptions,
    ReactionRun, Runtime, Signal, Subscription,
};
pub use resource::{resource, Resource, ResourceOptions, ResourceState, ResourceStatus};
