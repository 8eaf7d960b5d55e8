//! Update Scheduler
//!
//! The scheduler owns every node of the dependency graph and decides which
//! nodes are affected when a source changes.
//!
//! # Algorithm
//!
//! Propagation is "push dirtiness, pull values":
//!
//! 1. When a source node changes, its version is bumped.
//! 2. Its direct dependents are marked `Dirty` (they certainly read a stale value).
//! 3. Everything further downstream is marked `MaybeDirty`, once. A node that
//!    was already not clean has already propagated to its own dependents.
//! 4. Every effect reached is returned so the caller can queue it.
//!
//! Nothing is recomputed here. Derived nodes recompute lazily when read; a
//! maybe-dirty node compares the versions it observed last time against the
//! current ones and only re-runs if one of them moved.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::node::{DirtyState, Node, NodeId, NodeKind};

/// Effects reached by one propagation.
pub type Scheduled = SmallVec<[NodeId; 4]>;

/// The update scheduler manages the dependency graph and coordinates updates.
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node. Removing an unknown node
    /// is a no-op.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(&node_id) {
            for dep_id in node.dependencies().keys() {
                if let Some(dep) = self.nodes.get_mut(dep_id) {
                    dep.remove_dependent(node_id);
                }
            }

            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    dependent.remove_dependency(node_id);
                }
            }
        }
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Current version of a node, if it exists.
    pub fn version(&self, node_id: NodeId) -> Option<u64> {
        self.nodes.get(&node_id).map(Node::version)
    }

    /// Replace the dependency set of `node_id` with what was read during its
    /// latest evaluation and rewire the reverse edges.
    ///
    /// The node ends up clean, unless one of the nodes it read changed again
    /// before the evaluation finished; then it stays dirty and `true` is
    /// returned. Edges to nodes that no longer exist are dropped.
    pub fn replace_dependencies<I>(&mut self, node_id: NodeId, deps: I) -> bool
    where
        I: IntoIterator<Item = (NodeId, u64)>,
    {
        let mut next: IndexMap<NodeId, u64> = IndexMap::new();
        let mut stale = false;
        for (dep, version) in deps {
            if dep == node_id {
                continue;
            }
            if let Some(current) = self.nodes.get(&dep).map(Node::version) {
                stale |= current != version;
                next.insert(dep, version);
            }
        }

        let Some(node) = self.nodes.get_mut(&node_id) else {
            return false;
        };
        if stale {
            node.mark_dirty();
        } else {
            node.mark_clean();
        }
        let previous = node.replace_dependencies(next.clone());

        for stale in previous.keys().filter(|dep| !next.contains_key(*dep)) {
            if let Some(dep) = self.nodes.get_mut(stale) {
                dep.remove_dependent(node_id);
            }
        }
        for fresh in next.keys() {
            if let Some(dep) = self.nodes.get_mut(fresh) {
                dep.add_dependent(node_id);
            }
        }
        stale
    }

    /// Mark a source node as changed and propagate dirty flags.
    ///
    /// Returns the effects that need to be (re-)queued.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Scheduled {
        let mut queue = VecDeque::new();
        match self.nodes.get_mut(&source_id) {
            Some(source) => {
                source.bump_version();
                queue.extend(source.dependents().iter().map(|id| (*id, true)));
            }
            None => return Scheduled::new(),
        }
        self.propagate(queue)
    }

    /// Force a computation dirty and mark everything downstream of it
    /// maybe-dirty.
    ///
    /// Returns the effects that need to be (re-)queued, the node itself
    /// included if it is an effect.
    pub fn invalidate(&mut self, node_id: NodeId) -> Scheduled {
        let mut queue = VecDeque::new();
        queue.push_back((node_id, true));
        self.propagate(queue)
    }

    fn propagate(&mut self, mut queue: VecDeque<(NodeId, bool)>) -> Scheduled {
        let mut scheduled = Scheduled::new();

        while let Some((node_id, direct)) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };

            let was_clean = node.is_clean();
            if direct {
                node.mark_dirty();
            } else {
                node.mark_maybe_dirty();
            }

            match node.kind() {
                NodeKind::Effect => {
                    if !scheduled.contains(&node_id) {
                        scheduled.push(node_id);
                    }
                }
                NodeKind::Derived if was_clean => {
                    queue.extend(node.dependents().iter().map(|id| (*id, false)));
                }
                _ => {}
            }
        }

        scheduled
    }

    /// Dirty state of a node, if it exists.
    pub fn dirty_state(&self, node_id: NodeId) -> Option<DirtyState> {
        self.nodes.get(&node_id).map(Node::dirty_state)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(scheduler: &mut UpdateScheduler, ids: &[NodeId]) {
        for id in ids {
            scheduler.get_node_mut(*id).unwrap().mark_clean();
        }
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut scheduler = UpdateScheduler::new();

        let id1 = scheduler.add_node(Node::source());
        let id2 = scheduler.add_node(Node::derived());

        assert_eq!(scheduler.node_count(), 2);

        scheduler.remove_node(id1);
        assert_eq!(scheduler.node_count(), 1);
        assert!(scheduler.get_node(id1).is_none());
        assert!(scheduler.get_node(id2).is_some());
    }

    #[test]
    fn replace_dependencies_rewires_edges() {
        let mut scheduler = UpdateScheduler::new();

        let a = scheduler.add_node(Node::source());
        let b = scheduler.add_node(Node::source());
        let derived = scheduler.add_node(Node::derived());

        scheduler.replace_dependencies(derived, [(a, 0)]);
        assert!(scheduler.get_node(a).unwrap().dependents().contains(&derived));
        assert_eq!(scheduler.dirty_state(derived), Some(DirtyState::Clean));

        scheduler.replace_dependencies(derived, [(b, 0)]);
        assert!(!scheduler.get_node(a).unwrap().dependents().contains(&derived));
        assert!(scheduler.get_node(b).unwrap().dependents().contains(&derived));
        assert!(!scheduler
            .get_node(derived)
            .unwrap()
            .dependencies()
            .contains_key(&a));
    }

    #[test]
    fn removing_a_node_drops_its_edges() {
        let mut scheduler = UpdateScheduler::new();

        let source = scheduler.add_node(Node::source());
        let derived = scheduler.add_node(Node::derived());
        scheduler.replace_dependencies(derived, [(source, 0)]);

        scheduler.remove_node(derived);
        assert!(scheduler.get_node(source).unwrap().dependents().is_empty());
    }

    #[test]
    fn reads_that_went_stale_leave_the_node_dirty() {
        let mut scheduler = UpdateScheduler::new();

        let source = scheduler.add_node(Node::source());
        let effect = scheduler.add_node(Node::effect());
        scheduler.get_node_mut(source).unwrap().bump_version();

        // observed version 0, current version 1
        assert!(scheduler.replace_dependencies(effect, [(source, 0)]));
        assert_eq!(scheduler.dirty_state(effect), Some(DirtyState::Dirty));

        assert!(!scheduler.replace_dependencies(effect, [(source, 1)]));
        assert_eq!(scheduler.dirty_state(effect), Some(DirtyState::Clean));
    }

    #[test]
    fn invalidate_reaches_readers_of_the_node() {
        let mut scheduler = UpdateScheduler::new();

        // source -> derived -> effect
        let source = scheduler.add_node(Node::source());
        let derived = scheduler.add_node(Node::derived());
        let effect = scheduler.add_node(Node::effect());
        scheduler.replace_dependencies(derived, [(source, 0)]);
        scheduler.replace_dependencies(effect, [(derived, 0)]);
        clean(&mut scheduler, &[derived, effect]);

        let scheduled = scheduler.invalidate(derived);
        assert_eq!(scheduled.as_slice(), &[effect]);
        assert_eq!(scheduler.version(derived), Some(0));
        assert_eq!(scheduler.dirty_state(derived), Some(DirtyState::Dirty));
        assert_eq!(scheduler.dirty_state(effect), Some(DirtyState::MaybeDirty));
    }

    #[test]
    fn mark_changed_propagates() {
        let mut scheduler = UpdateScheduler::new();

        // source -> derived1 -> derived2 -> effect
        let source = scheduler.add_node(Node::source());
        let derived1 = scheduler.add_node(Node::derived());
        let derived2 = scheduler.add_node(Node::derived());
        let effect = scheduler.add_node(Node::effect());

        scheduler.replace_dependencies(derived1, [(source, 0)]);
        scheduler.replace_dependencies(derived2, [(derived1, 0)]);
        scheduler.replace_dependencies(effect, [(derived2, 0)]);
        clean(&mut scheduler, &[derived1, derived2, effect]);

        let scheduled = scheduler.mark_changed(source);

        assert_eq!(scheduled.as_slice(), &[effect]);
        assert_eq!(scheduler.version(source), Some(1));
        assert_eq!(scheduler.dirty_state(derived1), Some(DirtyState::Dirty));
        assert_eq!(scheduler.dirty_state(derived2), Some(DirtyState::MaybeDirty));
        assert_eq!(scheduler.dirty_state(effect), Some(DirtyState::MaybeDirty));
    }

    #[test]
    fn direct_effect_dependents_become_dirty() {
        let mut scheduler = UpdateScheduler::new();

        let source = scheduler.add_node(Node::source());
        let effect = scheduler.add_node(Node::effect());
        scheduler.replace_dependencies(effect, [(source, 0)]);

        let scheduled = scheduler.mark_changed(source);
        assert_eq!(scheduled.as_slice(), &[effect]);
        assert_eq!(scheduler.dirty_state(effect), Some(DirtyState::Dirty));
    }

    #[test]
    fn changing_an_unknown_node_schedules_nothing() {
        let mut scheduler = UpdateScheduler::new();
        assert!(scheduler.mark_changed(NodeId::new()).is_empty());
    }
}
