//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph and schedules updates when signals
//! change.
//!
//! # How It Works
//!
//! 1. Every signal, memo and effect owns a node in the graph through a
//!    [`NodeHandle`]. Memos and effects also register themselves so the
//!    runtime can reach them by node ID.
//!
//! 2. When a memo or effect reads a node inside its [`ReactiveContext`], the
//!    read is recorded together with the node's current version. When the
//!    evaluation finishes, the runtime replaces the node's dependency edges
//!    with exactly what was read.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Bumps its version
//!    b. Marks direct dependents dirty and transitive ones maybe-dirty
//!    c. Queues reached effects on the current batch
//!    d. Memos stay lazy: they recompute on next access
//!
//! 4. A maybe-dirty computation refreshes its upstream memos in read order
//!    and re-runs only if one of their versions moved.
//!
//! # Thread Safety
//!
//! The graph and registry live behind one global mutex. The lock is never
//! held while user code runs: computations are looked up, the lock is
//! released, and only then are they refreshed or executed.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use super::batch;
use super::context::{Dependencies, ReactiveContext};
use crate::config::{self, RuntimeConfig};
use crate::error::ReactiveError;
use crate::graph::{DirtyState, Node, NodeId, NodeKind, UpdateScheduler};

/// A computation the runtime can bring up to date.
pub trait Reactive: Send + Sync {
    /// The node this computation owns.
    fn node_id(&self) -> NodeId;

    /// Bring the computation up to date.
    ///
    /// Memos recompute if needed; effects re-run if needed.
    fn update(&self) -> Result<(), ReactiveError>;

    /// Check if this reactive value is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;
}

/// Ownership of a graph node.
///
/// Dropping this handle removes the node and all of its edges.
#[derive(Debug)]
pub struct NodeHandle {
    id: NodeId,
}

impl NodeHandle {
    /// Add a node of the given kind to the graph.
    pub fn new(kind: NodeKind) -> Self {
        let node = Node::new(kind);
        let id = state().lock().graph.add_node(node);
        tracing::trace!(node = %id, ?kind, "node created");
        Self { id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        Runtime::remove_node(self.id);
    }
}

struct RuntimeState {
    graph: UpdateScheduler,
    /// Computations reachable by node ID. Weak so the graph never keeps them alive.
    registry: HashMap<NodeId, Weak<dyn Reactive>>,
    /// Live effects. Held strongly until disposed.
    effects: HashMap<NodeId, Arc<dyn Reactive>>,
}

static STATE: OnceLock<Mutex<RuntimeState>> = OnceLock::new();

fn state() -> &'static Mutex<RuntimeState> {
    STATE.get_or_init(|| {
        Mutex::new(RuntimeState {
            graph: UpdateScheduler::new(),
            registry: HashMap::new(),
            effects: HashMap::new(),
        })
    })
}

/// The global reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a computation so it can be refreshed by node ID.
    pub fn register(reactive: &Arc<dyn Reactive>) {
        let id = reactive.node_id();
        state().lock().registry.insert(id, Arc::downgrade(reactive));
    }

    /// Keep an effect alive until [`release_effect`](Self::release_effect).
    pub(crate) fn retain_effect(reactive: Arc<dyn Reactive>) {
        let id = reactive.node_id();
        state().lock().effects.insert(id, reactive);
    }

    /// Drop the runtime's strong reference to an effect.
    pub(crate) fn release_effect(id: NodeId) {
        let released = state().lock().effects.remove(&id);
        drop(released);
    }

    /// Remove a node, its edges and its registration. Idempotent.
    pub fn remove_node(id: NodeId) {
        let released = {
            let mut state = state().lock();
            state.graph.remove_node(id);
            state.registry.remove(&id);
            state.effects.remove(&id)
        };
        // Dropped outside the lock: an effect's drop glue may remove more nodes.
        drop(released);
    }

    /// Look up a registered computation.
    pub(crate) fn lookup(id: NodeId) -> Option<Arc<dyn Reactive>> {
        let state = state().lock();
        if let Some(effect) = state.effects.get(&id) {
            return Some(Arc::clone(effect));
        }
        state.registry.get(&id).and_then(Weak::upgrade)
    }

    /// Record a read of `id` by the computation currently being evaluated.
    pub fn track_read(id: NodeId) {
        let Some(subscriber) = ReactiveContext::current_subscriber() else {
            return;
        };
        let version = state().lock().graph.version(id);
        if let Some(version) = version {
            tracing::trace!(node = %id, subscriber = %subscriber, version, "dependency read");
            ReactiveContext::track_dependency(id, version);
        }
    }

    /// Notify the graph that a source node's value changed.
    ///
    /// Propagation is synchronous. Reached effects are queued and run when
    /// the outermost batch exits (immediately, outside a batch).
    pub fn notify_changed(id: NodeId) {
        let scheduled = state().lock().graph.mark_changed(id);
        tracing::trace!(node = %id, effects = scheduled.len(), "node changed");
        batch::schedule(scheduled);
    }

    /// Decide whether a computation has to re-run.
    ///
    /// Clean nodes never do and dirty nodes always do. A maybe-dirty node
    /// refreshes its upstream memos in read order and re-runs only if one of
    /// their versions differs from what it observed last time; otherwise it
    /// is marked clean.
    pub fn needs_update(id: NodeId) -> Result<bool, ReactiveError> {
        let (dirty, dependencies) = {
            let state = state().lock();
            match state.graph.get_node(id) {
                Some(node) => (node.dirty_state(), node.dependencies().clone()),
                None => return Ok(false),
            }
        };

        match dirty {
            DirtyState::Clean => Ok(false),
            DirtyState::Dirty => Ok(true),
            DirtyState::MaybeDirty => {
                for (dependency, observed) in dependencies {
                    if let Some(upstream) = Self::lookup(dependency) {
                        upstream.update()?;
                    }
                    if Self::version(dependency) != Some(observed) {
                        return Ok(true);
                    }
                }

                if let Some(node) = state().lock().graph.get_node_mut(id) {
                    if node.dirty_state() == DirtyState::MaybeDirty {
                        node.mark_clean();
                    }
                }
                Ok(false)
            }
        }
    }

    /// Replace the dependency edges of `id` with what its evaluation read.
    ///
    /// Returns `true` if something it read changed while it was running.
    pub(crate) fn commit_dependencies(id: NodeId, dependencies: Dependencies) -> bool {
        tracing::trace!(node = %id, count = dependencies.len(), "dependencies committed");
        state()
            .lock()
            .graph
            .replace_dependencies(id, dependencies)
    }

    /// Record that a derived node produced a new value.
    pub(crate) fn bump_version(id: NodeId) {
        if let Some(node) = state().lock().graph.get_node_mut(id) {
            node.bump_version();
        }
    }

    /// Force a computation dirty. Its dependents become maybe-dirty and
    /// the effects reached are queued, as for a changed source.
    pub(crate) fn invalidate(id: NodeId) {
        let scheduled = state().lock().graph.invalidate(id);
        tracing::trace!(node = %id, effects = scheduled.len(), "node invalidated");
        batch::schedule(scheduled);
    }

    pub fn dirty_state(id: NodeId) -> Option<DirtyState> {
        state().lock().graph.dirty_state(id)
    }

    pub fn version(id: NodeId) -> Option<u64> {
        state().lock().graph.version(id)
    }

    /// Number of upstream edges of a node.
    pub fn dependency_count(id: NodeId) -> usize {
        state()
            .lock()
            .graph
            .get_node(id)
            .map_or(0, |node| node.dependencies().len())
    }

    /// Number of downstream edges of a node.
    pub fn dependent_count(id: NodeId) -> usize {
        state()
            .lock()
            .graph
            .get_node(id)
            .map_or(0, |node| node.dependents().len())
    }

    /// Total number of live nodes.
    pub fn node_count() -> usize {
        state().lock().graph.node_count()
    }

    /// Install process-wide settings.
    pub fn configure(config: RuntimeConfig) {
        tracing::debug!(?config, "runtime configured");
        config::install(config);
    }

    /// Current process-wide settings.
    pub fn config() -> RuntimeConfig {
        config::current()
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<NodeId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
