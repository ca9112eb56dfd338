//! Link Management
//!
//! [`Graph`] owns every node and link. This module holds the structural
//! operations: recording a read (`link`), bracketing a run
//! (`start_tracking` / `end_tracking`) and removing nodes.
//!
//! # Tracking Cursor
//!
//! While a consumer runs, `deps_tail` marks the last dependency confirmed in
//! this run. A read that matches the entry right after the cursor just
//! advances it, so a consumer whose reads come in a stable order re-runs
//! without allocating. Whatever lies past the cursor when the run ends was not
//! read and is unlinked.

use std::collections::VecDeque;

use smallvec::SmallVec;
use tracing::trace;

use super::arena::Arena;
use super::flags::NodeFlags;
use super::node::{Link, LinkId, NodeId, NodeKind, ReactiveNode};

/// The dependency graph plus the effect notification buffer.
#[derive(Debug, Default)]
pub struct Graph {
    pub(super) nodes: Arena<NodeId, ReactiveNode>,
    pub(super) links: Arena<LinkId, Link>,
    /// Effects waiting for delivery, in the order they were notified.
    pub(super) queued: VecDeque<NodeId>,
    /// Emit a trace event for every propagation mark.
    pub(crate) trace_marks: bool,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node of the given kind.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.insert(ReactiveNode::new(kind))
    }

    /// Get a node, if it is still alive.
    pub fn node(&self, id: NodeId) -> Option<&ReactiveNode> {
        self.nodes.get(id)
    }

    /// Get a node mutably, if it is still alive.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ReactiveNode> {
        self.nodes.get_mut(id)
    }

    /// Whether `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Get a link, if it is still alive.
    pub fn link_ref(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    /// Flags of a node; empty for dead nodes.
    pub fn flags(&self, id: NodeId) -> NodeFlags {
        self.nodes.get(id).map(|n| n.flags).unwrap_or_default()
    }

    /// Overwrite the flags of a live node.
    pub fn set_flags(&mut self, id: NodeId, flags: NodeFlags) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.flags = flags;
        }
    }

    /// Clear some flags of a live node.
    pub fn clear_flags(&mut self, id: NodeId, flags: NodeFlags) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.flags.remove(flags);
        }
    }

    /// Bump the version of a node after its value changed.
    pub fn bump_version(&mut self, id: NodeId) -> u64 {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.version += 1;
                node.version
            }
            None => 0,
        }
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Producers `sub` currently depends on, in read order.
    pub fn dependencies(&self, sub: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(sub).and_then(|n| n.deps);
        while let Some(id) = cursor {
            let Some(link) = self.links.get(id) else { break };
            out.push(link.dep);
            cursor = link.next_dep;
        }
        out
    }

    /// Consumers subscribed to `dep`, in subscription order.
    pub fn subscribers(&self, dep: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(dep).and_then(|n| n.subs);
        while let Some(id) = cursor {
            let Some(link) = self.links.get(id) else { break };
            out.push(link.sub);
            cursor = link.next_sub;
        }
        out
    }

    // ------------------------------------------------------------------
    // Notification buffer
    // ------------------------------------------------------------------

    pub(crate) fn enqueue(&mut self, effect: NodeId) {
        self.queued.push_back(effect);
    }

    /// Pop the next queued effect.
    pub fn dequeue(&mut self) -> Option<NodeId> {
        self.queued.pop_front()
    }

    /// Number of queued entries, including tombstones of disposed effects.
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Drop every queued effect, clearing their `NOTIFIED` flag so a later
    /// propagation can queue them again. Returns how many were live.
    pub fn clear_queue(&mut self) -> usize {
        let mut dropped = 0;
        while let Some(id) = self.queued.pop_front() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.flags.remove(NodeFlags::NOTIFIED);
                dropped += 1;
            }
        }
        dropped
    }

    // ------------------------------------------------------------------
    // Linking
    // ------------------------------------------------------------------

    /// Record that `sub` read `dep` during its current run.
    ///
    /// Returns the link that now represents the edge, or `None` when either
    /// node is gone.
    pub fn link(&mut self, dep: NodeId, sub: NodeId) -> Option<LinkId> {
        let (current, first) = {
            let node = self.nodes.get(sub)?;
            (node.deps_tail, node.deps)
        };
        let dep_tail = self.nodes.get(dep)?.subs_tail;

        // Repeated read of the producer just recorded.
        if let Some(cur) = current {
            if self.links.get(cur).is_some_and(|l| l.dep == dep) {
                return Some(cur);
            }
        }

        // Same producer as the previous run read at this position.
        let next = match current {
            Some(cur) => self.links.get(cur).and_then(|l| l.next_dep),
            None => first,
        };
        if let Some(next_id) = next {
            if self.links.get(next_id).is_some_and(|l| l.dep == dep) {
                if let Some(node) = self.nodes.get_mut(sub) {
                    node.deps_tail = Some(next_id);
                }
                return Some(next_id);
            }
        }

        // Already linked earlier in this run, out of order.
        if let Some(tail) = dep_tail {
            if self.links.get(tail).is_some_and(|l| l.sub == sub) && self.is_valid_link(tail, sub) {
                return Some(tail);
            }
        }

        Some(self.link_new_dep(dep, sub, next, current))
    }

    fn link_new_dep(
        &mut self,
        dep: NodeId,
        sub: NodeId,
        next_dep: Option<LinkId>,
        deps_tail: Option<LinkId>,
    ) -> LinkId {
        let prev_sub = self.nodes.get(dep).and_then(|n| n.subs_tail);
        let id = self.links.insert(Link {
            dep,
            sub,
            prev_sub,
            next_sub: None,
            next_dep,
        });

        match deps_tail.and_then(|t| self.links.get_mut(t)) {
            Some(tail) => tail.next_dep = Some(id),
            None => {
                if let Some(node) = self.nodes.get_mut(sub) {
                    node.deps = Some(id);
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(sub) {
            node.deps_tail = Some(id);
        }

        match prev_sub.and_then(|p| self.links.get_mut(p)) {
            Some(prev) => prev.next_sub = Some(id),
            None => {
                if let Some(node) = self.nodes.get_mut(dep) {
                    node.subs = Some(id);
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(dep) {
            node.subs_tail = Some(id);
        }

        trace!(%dep, %sub, "linked");
        id
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Begin a run of `sub`: rewind the cursor and clear transient marks.
    pub fn start_tracking(&mut self, sub: NodeId) {
        if let Some(node) = self.nodes.get_mut(sub) {
            node.deps_tail = None;
            node.flags.remove(NodeFlags::NOTIFIED | NodeFlags::RECURSED | NodeFlags::PROPAGATED);
            node.flags.insert(NodeFlags::TRACKING);
        }
    }

    /// Finish a run of `sub`, unlinking every dependency that was not read.
    ///
    /// Returns the effects that were disposed because they lost their last
    /// subscriber.
    pub fn end_tracking(&mut self, sub: NodeId) -> Vec<NodeId> {
        let stale = {
            let Some(node) = self.nodes.get_mut(sub) else {
                return Vec::new();
            };
            node.flags.remove(NodeFlags::TRACKING);
            match node.deps_tail {
                Some(tail) => tail,
                None => {
                    let head = node.deps.take();
                    return match head {
                        Some(head) => self.release_dependencies(head),
                        None => Vec::new(),
                    };
                }
            }
        };

        let rest = self.links.get_mut(stale).and_then(|l| l.next_dep.take());
        match rest {
            Some(head) => self.release_dependencies(head),
            None => Vec::new(),
        }
    }

    /// Unlink a chain of dependency links (following `next_dep`) from their
    /// producers, freeing each link.
    ///
    /// A producer losing its last subscriber this way is deactivated: a
    /// computed drops its own dependencies and is marked dirty so the next
    /// read recomputes it; an effect is removed outright.
    fn release_dependencies(&mut self, head: LinkId) -> Vec<NodeId> {
        let mut removed = Vec::new();
        let mut work: SmallVec<[LinkId; 8]> = SmallVec::new();
        work.push(head);

        while let Some(start) = work.pop() {
            let mut cursor = Some(start);
            while let Some(id) = cursor {
                let Some(link) = self.links.remove(id) else { break };
                cursor = link.next_dep;
                self.detach_from_producer(&link);
                trace!(dep = %link.dep, sub = %link.sub, "unlinked");

                let Some(dep) = self.nodes.get_mut(link.dep) else { continue };
                if dep.subs.is_some() || dep.kind() == NodeKind::Signal {
                    continue;
                }
                dep.flags.insert(NodeFlags::DIRTY);
                dep.deps_tail = None;
                if let Some(dep_head) = dep.deps.take() {
                    work.push(dep_head);
                }
                if dep.kind() == NodeKind::Effect {
                    self.nodes.remove(link.dep);
                    removed.push(link.dep);
                }
            }
        }

        removed
    }

    /// Splice `link` out of its producer's subscriber list.
    fn detach_from_producer(&mut self, link: &Link) {
        match link.next_sub.and_then(|n| self.links.get_mut(n)) {
            Some(next) => next.prev_sub = link.prev_sub,
            None => {
                if let Some(dep) = self.nodes.get_mut(link.dep) {
                    dep.subs_tail = link.prev_sub;
                }
            }
        }
        match link.prev_sub.and_then(|p| self.links.get_mut(p)) {
            Some(prev) => prev.next_sub = link.next_sub,
            None => {
                if let Some(dep) = self.nodes.get_mut(link.dep) {
                    dep.subs = link.next_sub;
                }
            }
        }
    }

    /// Splice `link` out of its consumer's dependency list.
    fn detach_from_consumer(&mut self, id: LinkId, link: &Link) {
        let Some(sub) = self.nodes.get(link.sub) else { return };
        let mut prev: Option<LinkId> = None;
        let mut cursor = sub.deps;
        while let Some(current) = cursor {
            if current == id {
                break;
            }
            prev = Some(current);
            cursor = self.links.get(current).and_then(|l| l.next_dep);
        }
        if cursor.is_none() {
            return;
        }

        match prev.and_then(|p| self.links.get_mut(p)) {
            Some(prev_link) => prev_link.next_dep = link.next_dep,
            None => {
                if let Some(sub) = self.nodes.get_mut(link.sub) {
                    sub.deps = link.next_dep;
                }
            }
        }
        if let Some(sub) = self.nodes.get_mut(link.sub) {
            if sub.deps_tail == Some(id) {
                sub.deps_tail = prev;
            }
        }
    }

    /// Remove a node and every link touching it.
    ///
    /// Returns every node removed, starting with `id` itself, followed by
    /// effects that were disposed because they lost their last subscriber.
    /// Removing a dead node returns an empty list.
    pub fn remove_node(&mut self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Vec::new();
        };
        let deps = node.deps.take();
        node.deps_tail = None;
        let mut subs = node.subs.take();
        node.subs_tail = None;

        while let Some(link_id) = subs {
            let Some(link) = self.links.remove(link_id) else { break };
            subs = link.next_sub;
            self.detach_from_consumer(link_id, &link);
        }

        let mut removed = vec![id];
        if let Some(head) = deps {
            removed.extend(self.release_dependencies(head));
        }
        self.nodes.remove(id);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(graph: &mut Graph, sub: NodeId, reads: &[NodeId]) -> Vec<NodeId> {
        graph.start_tracking(sub);
        for &dep in reads {
            graph.link(dep, sub);
        }
        graph.end_tracking(sub)
    }

    #[test]
    fn link_records_dependency_and_subscriber() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let c = graph.add_node(NodeKind::Computed);

        run(&mut graph, c, &[a]);

        assert_eq!(graph.dependencies(c), vec![a]);
        assert_eq!(graph.subscribers(a), vec![c]);
        assert_eq!(graph.link_count(), 1);
    }

    #[test]
    fn repeated_reads_do_not_duplicate_links() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Signal);
        let c = graph.add_node(NodeKind::Computed);

        run(&mut graph, c, &[a, a, b, a, b]);

        assert_eq!(graph.dependencies(c), vec![a, b]);
        assert_eq!(graph.subscribers(a), vec![c]);
        assert_eq!(graph.subscribers(b), vec![c]);
        assert_eq!(graph.link_count(), 2);
    }

    #[test]
    fn stable_rerun_reuses_links() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Signal);
        let c = graph.add_node(NodeKind::Computed);

        run(&mut graph, c, &[a, b]);
        let before = graph.node(c).and_then(|n| n.deps);
        run(&mut graph, c, &[a, b]);

        assert_eq!(graph.node(c).and_then(|n| n.deps), before);
        assert_eq!(graph.link_count(), 2);
    }

    #[test]
    fn end_tracking_drops_unread_dependencies() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Signal);
        let d = graph.add_node(NodeKind::Signal);
        let c = graph.add_node(NodeKind::Computed);

        run(&mut graph, c, &[a, b, d]);
        run(&mut graph, c, &[b]);

        assert_eq!(graph.dependencies(c), vec![b]);
        assert!(graph.subscribers(a).is_empty());
        assert!(graph.subscribers(d).is_empty());
        assert_eq!(graph.subscribers(b), vec![c]);
        assert_eq!(graph.link_count(), 1);
    }

    #[test]
    fn run_with_no_reads_clears_all_dependencies() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let c = graph.add_node(NodeKind::Computed);

        run(&mut graph, c, &[a]);
        run(&mut graph, c, &[]);

        assert!(graph.dependencies(c).is_empty());
        assert!(graph.subscribers(a).is_empty());
        assert_eq!(graph.link_count(), 0);
    }

    #[test]
    fn reordered_reads_keep_exact_dependency_set() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Signal);
        let c = graph.add_node(NodeKind::Computed);

        run(&mut graph, c, &[a, b]);
        run(&mut graph, c, &[b, a]);

        let mut deps = graph.dependencies(c);
        deps.sort_by_key(|id| id.index());
        assert_eq!(deps, vec![a, b]);
        assert_eq!(graph.subscribers(a), vec![c]);
        assert_eq!(graph.subscribers(b), vec![c]);
        assert_eq!(graph.link_count(), 2);
    }

    #[test]
    fn tracking_flag_brackets_the_run() {
        let mut graph = Graph::new();
        let c = graph.add_node(NodeKind::Computed);

        graph.start_tracking(c);
        assert!(graph.flags(c).is_tracking());
        assert!(!graph.flags(c).contains(NodeFlags::DIRTY));
        graph.end_tracking(c);
        assert!(!graph.flags(c).is_tracking());
    }

    #[test]
    fn orphaned_computed_is_deactivated_not_removed() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let mid = graph.add_node(NodeKind::Computed);
        let top = graph.add_node(NodeKind::Effect);

        run(&mut graph, mid, &[a]);
        run(&mut graph, top, &[mid]);
        let removed = run(&mut graph, top, &[]);

        assert!(removed.is_empty());
        assert!(graph.contains(mid));
        assert!(graph.flags(mid).contains(NodeFlags::DIRTY));
        assert!(graph.dependencies(mid).is_empty());
        assert!(graph.subscribers(a).is_empty());
    }

    #[test]
    fn orphaned_child_effect_is_removed() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let parent = graph.add_node(NodeKind::Effect);
        let child = graph.add_node(NodeKind::Effect);

        run(&mut graph, child, &[a]);
        run(&mut graph, parent, &[child]);
        let removed = run(&mut graph, parent, &[]);

        assert_eq!(removed, vec![child]);
        assert!(!graph.contains(child));
        assert!(graph.subscribers(a).is_empty());
        assert_eq!(graph.link_count(), 0);
    }

    #[test]
    fn remove_node_unlinks_both_directions() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Signal);
        let mid = graph.add_node(NodeKind::Computed);
        let e = graph.add_node(NodeKind::Effect);

        run(&mut graph, mid, &[a]);
        run(&mut graph, e, &[b, mid]);

        let removed = graph.remove_node(mid);
        assert_eq!(removed, vec![mid]);
        assert!(graph.subscribers(a).is_empty());
        assert_eq!(graph.dependencies(e), vec![b]);
        assert_eq!(graph.node(e).and_then(|n| n.deps_tail), graph.node(e).and_then(|n| n.deps));
        assert_eq!(graph.link_count(), 1);

        assert!(graph.remove_node(mid).is_empty());
    }

    #[test]
    fn clear_queue_resets_notified() {
        let mut graph = Graph::new();
        let e = graph.add_node(NodeKind::Effect);
        graph.set_flags(e, NodeFlags::EFFECT | NodeFlags::NOTIFIED | NodeFlags::DIRTY);
        graph.enqueue(e);

        assert_eq!(graph.clear_queue(), 1);
        assert!(!graph.flags(e).contains(NodeFlags::NOTIFIED));
        assert_eq!(graph.queued_len(), 0);
    }
}
