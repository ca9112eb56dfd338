//! Node State Flags
//!
//! Every node carries one [`NodeFlags`] value. The low bits say what the node
//! is (computed, effect); the rest form the propagation state machine.

bitflags::bitflags! {
    /// Kind and state bits of a reactive node.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u16 {
        /// The node is a computed value (both producer and consumer).
        const COMPUTED = 1 << 0;
        /// The node is an effect.
        const EFFECT = 1 << 1;
        /// The node is running and recording the producers it reads.
        const TRACKING = 1 << 2;
        /// The node was marked by a propagation pass and, for effects, queued.
        const NOTIFIED = 1 << 3;
        /// The node was reached through a link while it was running.
        const RECURSED = 1 << 4;
        /// A direct dependency is known to have changed value.
        const DIRTY = 1 << 5;
        /// Something upstream changed; dependencies need a pull check.
        const PENDING_COMPUTED = 1 << 6;
        /// A child effect became dirty.
        const PENDING_EFFECT = 1 << 7;

        /// Already marked by the current propagation pass.
        const PROPAGATED = Self::DIRTY.bits()
            | Self::PENDING_COMPUTED.bits()
            | Self::PENDING_EFFECT.bits();
    }
}

impl NodeFlags {
    /// Any of the propagation marks is set.
    pub fn is_propagated(self) -> bool {
        self.intersects(Self::PROPAGATED)
    }

    /// The node is mid-run.
    pub fn is_tracking(self) -> bool {
        self.contains(Self::TRACKING)
    }

    /// An effect that has not been queued yet.
    pub fn is_unqueued_effect(self) -> bool {
        self & (Self::EFFECT | Self::NOTIFIED) == Self::EFFECT
    }

    /// Pending a pull check and not yet known to be dirty.
    pub fn is_only_pending(self) -> bool {
        self & (Self::PENDING_COMPUTED | Self::DIRTY) == Self::PENDING_COMPUTED
    }

    /// A computed whose cached value is known stale.
    pub fn is_dirty_computed(self) -> bool {
        self.contains(Self::COMPUTED | Self::DIRTY)
    }

    /// A computed whose dependencies must be checked before use.
    pub fn is_pending_computed(self) -> bool {
        self.contains(Self::COMPUTED | Self::PENDING_COMPUTED)
    }

    /// Cached value may be stale and must be resolved before it is read.
    pub fn needs_resolution(self) -> bool {
        self.intersects(Self::DIRTY | Self::PENDING_COMPUTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagated_is_the_three_marks() {
        assert_eq!(
            NodeFlags::PROPAGATED,
            NodeFlags::DIRTY | NodeFlags::PENDING_COMPUTED | NodeFlags::PENDING_EFFECT
        );
        assert!(NodeFlags::PENDING_EFFECT.is_propagated());
        assert!(!(NodeFlags::NOTIFIED | NodeFlags::RECURSED).is_propagated());
    }

    #[test]
    fn unqueued_effect_predicate() {
        assert!(NodeFlags::EFFECT.is_unqueued_effect());
        assert!((NodeFlags::EFFECT | NodeFlags::DIRTY).is_unqueued_effect());
        assert!(!(NodeFlags::EFFECT | NodeFlags::NOTIFIED).is_unqueued_effect());
        assert!(!NodeFlags::COMPUTED.is_unqueued_effect());
    }

    #[test]
    fn pending_predicates() {
        let pending = NodeFlags::COMPUTED | NodeFlags::PENDING_COMPUTED;
        assert!(pending.is_only_pending());
        assert!(pending.is_pending_computed());
        assert!(!pending.is_dirty_computed());

        let both = pending | NodeFlags::DIRTY;
        assert!(!both.is_only_pending());
        assert!(both.is_dirty_computed());
        assert!(both.needs_resolution());
    }
}
