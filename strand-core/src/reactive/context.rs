//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a producer is read,
//! the innermost running consumer is linked to it.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running a computed or effect pushes its id;
//! [`untrack`] pushes an empty entry so reads inside it record nothing. The
//! guard pops on drop, which keeps the stack balanced even when the
//! computation panics.

use std::cell::RefCell;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<NodeId>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
#[derive(Debug)]
pub struct ReactiveContext {
    consumer: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a context in which reads are recorded against `consumer`.
    pub fn enter(consumer: NodeId) -> Self {
        Self::push(Some(consumer))
    }

    /// Enter a context in which reads are not recorded at all.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(consumer: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(consumer));
        Self { consumer }
    }

    /// The consumer that reads are currently recorded against, if any.
    pub fn current_consumer() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().copied().flatten())
    }

    /// Whether reads are currently being recorded.
    pub fn is_tracking() -> bool {
        Self::current_consumer().is_some()
    }

    /// Number of active contexts on this thread.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry, self.consumer,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.consumer, entry
                );
            }
        });
    }
}

/// Run `f` without recording any of its reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, NodeKind};

    fn ids() -> (NodeId, NodeId) {
        let mut graph = Graph::new();
        (graph.add_node(NodeKind::Effect), graph.add_node(NodeKind::Effect))
    }

    #[test]
    fn context_tracks_consumer() {
        let (id, _) = ids();

        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::current_consumer().is_none());

        {
            let _ctx = ReactiveContext::enter(id);
            assert!(ReactiveContext::is_tracking());
            assert_eq!(ReactiveContext::current_consumer(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_tracking());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let (id1, id2) = ids();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_consumer(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_consumer(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_consumer(), Some(id1));
        }

        assert!(ReactiveContext::current_consumer().is_none());
    }

    #[test]
    fn untrack_hides_the_consumer() {
        let (id, _) = ids();
        let _ctx = ReactiveContext::enter(id);

        let inside = untrack(ReactiveContext::current_consumer);
        assert_eq!(inside, None);
        assert_eq!(ReactiveContext::current_consumer(), Some(id));
    }

    #[test]
    fn context_is_restored_after_panic() {
        let (id, _) = ids();

        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(id);
            panic!("computation failed");
        });

        assert!(result.is_err());
        assert_eq!(ReactiveContext::depth(), 0);
    }
}
