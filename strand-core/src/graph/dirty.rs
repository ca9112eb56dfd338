//! Lazy Dirty Check
//!
//! Propagation only says "something upstream changed". Before a pending
//! consumer uses its cached state, [`check_dirty`] walks its dependencies in
//! read order and answers the precise question: did any of them actually
//! change value?
//!
//! Pending computed dependencies are resolved first, recursively, by
//! recomputing them through the `recompute` callback. A callback runs user
//! code that reads and links again, so the graph is only ever borrowed for
//! short steps and never while the callback runs.

use std::cell::RefCell;

use super::flags::NodeFlags;
use super::links::Graph;
use super::node::{LinkId, NodeId};

enum Step {
    /// A computed dependency is known stale.
    Recompute(NodeId),
    /// A computed dependency must check its own dependencies first.
    Descend(NodeId),
    /// Nothing to resolve for this dependency.
    Skip,
}

/// Whether any dependency of `sub` changed value.
///
/// `recompute` re-runs a computed and returns whether its value changed.
/// Stops at the first changed dependency, leaving later ones unresolved.
pub fn check_dirty<F>(graph: &RefCell<Graph>, sub: NodeId, recompute: &mut F) -> bool
where
    F: FnMut(NodeId) -> bool,
{
    let mut cursor = graph.borrow().node(sub).and_then(|n| n.deps);

    while let Some(link_id) = cursor {
        let step = {
            let g = graph.borrow();
            if g.flags(sub).contains(NodeFlags::DIRTY) {
                // Promoted by a sibling's shallow propagation.
                return true;
            }
            let Some(link) = g.link_ref(link_id) else { break };
            cursor = link.next_dep;
            let dep_flags = g.flags(link.dep);
            if dep_flags.is_dirty_computed() {
                Step::Recompute(link.dep)
            } else if dep_flags.is_pending_computed() {
                Step::Descend(link.dep)
            } else {
                Step::Skip
            }
        };

        match step {
            Step::Recompute(dep) => {
                if recompute_changed(graph, dep, recompute) {
                    return true;
                }
            }
            Step::Descend(dep) => {
                if check_dirty(graph, dep, recompute) {
                    if recompute_changed(graph, dep, recompute) {
                        return true;
                    }
                } else {
                    graph.borrow_mut().clear_flags(dep, NodeFlags::PENDING_COMPUTED);
                }
            }
            Step::Skip => {}
        }
    }

    false
}

/// Recompute `dep`; when its value changed, promote its other subscribers to
/// dirty so they skip their own dependency walk.
fn recompute_changed<F>(graph: &RefCell<Graph>, dep: NodeId, recompute: &mut F) -> bool
where
    F: FnMut(NodeId) -> bool,
{
    if !recompute(dep) {
        return false;
    }
    let mut g = graph.borrow_mut();
    let shared: Option<LinkId> = g
        .node(dep)
        .and_then(|n| n.subs)
        .filter(|&head| g.link_ref(head).is_some_and(|l| l.next_sub.is_some()));
    if let Some(head) = shared {
        g.shallow_propagate(head);
    }
    true
}
