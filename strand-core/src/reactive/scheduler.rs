//! Effect Scheduling
//!
//! By default a notified effect is delivered synchronously, at the end of the
//! write (or batch) that notified it. An effect created with a scheduler is
//! handed to that scheduler instead, and the host decides when to call
//! [`Effect::run`]. The run still performs the dirty check, so an effect
//! whose computed inputs settled back to their old values does nothing.
//!
//! The engine imposes no policy of its own. [`DeferredQueue`] is the simplest
//! useful one: collect now, run later in FIFO order.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::effect::Effect;

/// Receives effects whose delivery the host wants to control.
pub trait EffectScheduler {
    /// Called when `effect` needs to re-run.
    fn schedule(&self, effect: Effect);
}

impl<F: Fn(Effect)> EffectScheduler for F {
    fn schedule(&self, effect: Effect) {
        self(effect)
    }
}

/// A FIFO of deferred effects. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct DeferredQueue {
    pending: Rc<RefCell<VecDeque<Effect>>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of effects waiting to run.
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Run every waiting effect, including ones scheduled while running.
    /// Returns how many were taken off the queue.
    pub fn run_pending(&self) -> usize {
        let mut taken = 0;
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(effect) = next else { break };
            taken += 1;
            effect.run();
        }
        taken
    }
}

impl EffectScheduler for DeferredQueue {
    fn schedule(&self, effect: Effect) {
        let mut pending = self.pending.borrow_mut();
        if !pending.contains(&effect) {
            pending.push_back(effect);
        }
    }
}
