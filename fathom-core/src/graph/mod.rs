//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between
//! reactive values and the computations that read them.
//!
//! # Overview
//!
//! - Nodes represent reactive values (signals) or computations (memos, effects)
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them dirty or maybe-dirty. Computations then decide lazily, by
//! comparing node versions, whether they really have to re-run.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized and indexed by node ID for O(1) lookups.
//!
//! 2. Both forward (dependencies) and reverse (dependents) edges are kept.
//!
//! 3. Edges are plain IDs. The graph never owns a computation, so a
//!    subscription never keeps its reader alive.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use scheduler::{Scheduled, UpdateScheduler};
