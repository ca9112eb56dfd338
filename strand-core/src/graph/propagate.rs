//! Change Propagation
//!
//! Writing a producer pushes coarse marks down its subscriber tree:
//!
//! - direct subscribers of a written signal get `DIRTY`
//! - everything further down gets `PENDING_COMPUTED` (under a computed) or
//!   `PENDING_EFFECT` (under a child effect)
//!
//! Effects reached by the walk are appended to the graph's notification
//! buffer. Nothing user-visible runs here; reads resolve the marks later (see
//! [`check_dirty`](super::check_dirty)).
//!
//! The walk is iterative. Descending into a node's subscribers pushes the
//! sibling cursor of the current level, so stack usage is proportional to the
//! depth of the graph, never to its fan-out.

use smallvec::SmallVec;
use tracing::trace;

use super::flags::NodeFlags;
use super::links::Graph;
use super::node::{LinkId, NodeId};

impl Graph {
    /// Propagate a change through the subscriber list starting at `head`.
    pub fn propagate(&mut self, head: LinkId) {
        let mut current = head;
        let mut next = self.links.get(head).and_then(|l| l.next_sub);
        let mut target = NodeFlags::DIRTY;
        let mut levels: SmallVec<[(Option<LinkId>, NodeFlags); 8]> = SmallVec::new();

        'walk: loop {
            if let Some((child_head, child_target)) = self.mark_subscriber(current, target) {
                levels.push((next, target));
                current = child_head;
                next = self.links.get(child_head).and_then(|l| l.next_sub);
                target = child_target;
                continue;
            }

            loop {
                if let Some(sibling) = next {
                    current = sibling;
                    next = self.links.get(sibling).and_then(|l| l.next_sub);
                    continue 'walk;
                }
                match levels.pop() {
                    Some((resume, flag)) => {
                        next = resume;
                        target = flag;
                    }
                    None => return,
                }
            }
        }
    }

    /// Apply `target` to the subscriber behind `link`.
    ///
    /// Returns the subscriber's own subscriber list and the mark to push into
    /// it when the walk has to descend.
    fn mark_subscriber(&mut self, link: LinkId, target: NodeFlags) -> Option<(LinkId, NodeFlags)> {
        let sub = self.links.get(link)?.sub;
        let (flags, own_subs) = {
            let node = self.nodes.get(sub)?;
            (node.flags, node.subs)
        };
        let notified = target | NodeFlags::NOTIFIED;
        let mut should_notify = false;

        if !flags.intersects(NodeFlags::TRACKING | NodeFlags::RECURSED | NodeFlags::PROPAGATED) {
            // Idle and unmarked.
            self.set_flags(sub, flags | notified);
            should_notify = true;
        } else if flags.contains(NodeFlags::RECURSED) && !flags.is_tracking() {
            // Reached again through a feedback edge after its run finished.
            self.set_flags(sub, (flags - NodeFlags::RECURSED) | notified);
            should_notify = true;
        } else if !flags.is_propagated() && self.is_valid_link(link, sub) {
            // Running, and this producer was already read in the current run.
            self.set_flags(sub, flags | NodeFlags::RECURSED | notified);
            should_notify = own_subs.is_some() || flags.contains(NodeFlags::EFFECT);
        }

        if should_notify {
            self.trace_mark(sub, target);
            if let Some(child_head) = own_subs {
                let child_target = if flags.contains(NodeFlags::EFFECT) {
                    NodeFlags::PENDING_EFFECT
                } else {
                    NodeFlags::PENDING_COMPUTED
                };
                return Some((child_head, child_target));
            }
            if flags.contains(NodeFlags::EFFECT) {
                self.enqueue(sub);
            }
        } else if !flags.intersects(NodeFlags::TRACKING | target) {
            // Already marked with a different mark: add this one.
            self.set_flags(sub, flags | notified);
            self.trace_mark(sub, target);
            if flags.is_unqueued_effect() {
                self.enqueue(sub);
            }
        } else if !flags.contains(target) && flags.is_propagated() && self.is_valid_link(link, sub) {
            // Running but already marked: record the extra mark only.
            self.set_flags(sub, flags | target);
        }

        None
    }

    /// Promote direct subscribers from pending to dirty.
    ///
    /// Used after a computed recomputes to a new value: its subscribers were
    /// already marked `PENDING_COMPUTED` by the write, so one level is enough.
    pub fn shallow_propagate(&mut self, head: LinkId) {
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            let Some(link) = self.links.get(id) else { break };
            let (sub, next) = (link.sub, link.next_sub);
            let flags = self.flags(sub);
            if flags.is_only_pending() {
                self.set_flags(sub, flags | NodeFlags::DIRTY | NodeFlags::NOTIFIED);
                if flags.is_unqueued_effect() {
                    self.enqueue(sub);
                }
            }
            cursor = next;
        }
    }

    /// Whether `check` is one of the dependencies `sub` has confirmed in its
    /// current run (the entries up to and including the tracking cursor).
    pub fn is_valid_link(&self, check: LinkId, sub: NodeId) -> bool {
        let Some(node) = self.nodes.get(sub) else {
            return false;
        };
        let Some(tail) = node.deps_tail else {
            return false;
        };
        let mut cursor = node.deps;
        while let Some(id) = cursor {
            if id == check {
                return true;
            }
            if id == tail {
                break;
            }
            cursor = self.links.get(id).and_then(|l| l.next_dep);
        }
        false
    }

    fn trace_mark(&self, sub: NodeId, mark: NodeFlags) {
        if self.trace_marks {
            trace!(%sub, ?mark, "propagation mark");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::node::NodeKind;
    use crate::graph::{Graph, NodeFlags, NodeId};

    fn run(graph: &mut Graph, sub: NodeId, reads: &[NodeId]) {
        graph.start_tracking(sub);
        for &dep in reads {
            graph.link(dep, sub);
        }
        graph.end_tracking(sub);
    }

    fn write(graph: &mut Graph, signal: NodeId) {
        graph.bump_version(signal);
        if let Some(head) = graph.node(signal).and_then(|n| n.subs) {
            graph.propagate(head);
        }
    }

    fn drain(graph: &mut Graph) -> Vec<NodeId> {
        std::iter::from_fn(|| graph.dequeue()).collect()
    }

    #[test]
    fn direct_subscribers_become_dirty() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let c = graph.add_node(NodeKind::Computed);
        run(&mut graph, c, &[a]);

        write(&mut graph, a);

        let flags = graph.flags(c);
        assert!(flags.contains(NodeFlags::DIRTY | NodeFlags::NOTIFIED));
        assert!(drain(&mut graph).is_empty());
    }

    #[test]
    fn transitive_subscribers_become_pending() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Computed);
        let e = graph.add_node(NodeKind::Effect);
        run(&mut graph, b, &[a]);
        run(&mut graph, e, &[b]);

        write(&mut graph, a);

        assert!(graph.flags(b).contains(NodeFlags::DIRTY));
        assert!(graph.flags(e).contains(NodeFlags::PENDING_COMPUTED));
        assert!(!graph.flags(e).contains(NodeFlags::DIRTY));
        assert_eq!(drain(&mut graph), vec![e]);
    }

    #[test]
    fn diamond_queues_effect_once() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Computed);
        let c = graph.add_node(NodeKind::Computed);
        let e = graph.add_node(NodeKind::Effect);
        run(&mut graph, b, &[a]);
        run(&mut graph, c, &[a]);
        run(&mut graph, e, &[b, c]);

        write(&mut graph, a);

        assert_eq!(drain(&mut graph), vec![e]);
    }

    #[test]
    fn effects_queue_in_subscription_order() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let e1 = graph.add_node(NodeKind::Effect);
        let e2 = graph.add_node(NodeKind::Effect);
        let e3 = graph.add_node(NodeKind::Effect);
        run(&mut graph, e2, &[a]);
        run(&mut graph, e1, &[a]);
        run(&mut graph, e3, &[a]);

        write(&mut graph, a);

        assert_eq!(drain(&mut graph), vec![e2, e1, e3]);
    }

    #[test]
    fn second_write_does_not_requeue() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let e = graph.add_node(NodeKind::Effect);
        run(&mut graph, e, &[a]);

        write(&mut graph, a);
        write(&mut graph, a);

        assert_eq!(drain(&mut graph), vec![e]);
    }

    #[test]
    fn child_effect_marks_parent_pending_effect() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let parent = graph.add_node(NodeKind::Effect);
        let child = graph.add_node(NodeKind::Effect);
        run(&mut graph, child, &[a]);
        run(&mut graph, parent, &[child]);

        write(&mut graph, a);

        assert!(graph.flags(child).contains(NodeFlags::DIRTY));
        assert!(graph.flags(parent).contains(NodeFlags::PENDING_EFFECT));
        assert_eq!(drain(&mut graph), vec![parent]);
    }

    #[test]
    fn running_consumer_is_not_dirtied_by_unread_producer() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Signal);
        let c = graph.add_node(NodeKind::Computed);
        run(&mut graph, c, &[a, b]);

        // Mid-run, only `a` has been read again so far.
        graph.start_tracking(c);
        graph.link(a, c);
        write(&mut graph, b);
        assert!(!graph.flags(c).is_propagated());

        write(&mut graph, a);
        assert!(graph.flags(c).contains(NodeFlags::RECURSED | NodeFlags::DIRTY));
        graph.end_tracking(c);
    }

    #[test]
    fn shallow_propagate_promotes_pending_only() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Computed);
        let e = graph.add_node(NodeKind::Effect);
        let d = graph.add_node(NodeKind::Computed);
        run(&mut graph, b, &[a]);
        run(&mut graph, e, &[b]);
        run(&mut graph, d, &[b]);
        write(&mut graph, a);
        drain(&mut graph);
        graph.clear_flags(e, NodeFlags::NOTIFIED);

        let head = graph.node(b).and_then(|n| n.subs).expect("b has subscribers");
        graph.shallow_propagate(head);

        assert!(graph.flags(e).contains(NodeFlags::DIRTY));
        assert!(graph.flags(d).contains(NodeFlags::DIRTY));
        assert_eq!(drain(&mut graph), vec![e]);
    }

    #[test]
    fn is_valid_link_only_accepts_confirmed_entries() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Signal);
        let b = graph.add_node(NodeKind::Signal);
        let c = graph.add_node(NodeKind::Computed);
        run(&mut graph, c, &[a, b]);
        let links: Vec<_> = {
            let first = graph.node(c).and_then(|n| n.deps).expect("deps");
            let second = graph.link_ref(first).and_then(|l| l.next_dep).expect("second dep");
            vec![first, second]
        };

        graph.start_tracking(c);
        assert!(!graph.is_valid_link(links[0], c));
        graph.link(a, c);
        assert!(graph.is_valid_link(links[0], c));
        assert!(!graph.is_valid_link(links[1], c));
        graph.end_tracking(c);
    }
}
