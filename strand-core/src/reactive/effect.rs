//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued and delivered when
//!    the outermost batch ends.
//!
//! 3. Each run re-tracks its dependencies. Producers it stopped reading are
//!    unlinked at the end of the run.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - An effect that only depends on computeds runs only if one of them
//!   actually produced a new value.
//!
//! # Nesting
//!
//! An effect created while another effect is running becomes its child. The
//! child is disposed when the parent re-runs without re-creating it, and a
//! change that only reaches the child runs the child alone.

use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::runtime::Runtime;
use super::scheduler::EffectScheduler;
use crate::error::ComputeError;
use crate::graph::NodeId;

type RunFn = Box<dyn Fn() -> Result<(), ComputeError>>;

/// Runtime-side storage of an effect.
pub(crate) struct EffectState {
    run: RunFn,
    scheduler: Option<Box<dyn EffectScheduler>>,
    runs: Cell<usize>,
}

impl EffectState {
    pub(crate) fn invoke(&self) -> Result<(), ComputeError> {
        self.runs.set(self.runs.get() + 1);
        (self.run)()
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.get()
    }

    pub(crate) fn scheduler(&self) -> Option<&dyn EffectScheduler> {
        self.scheduler.as_deref()
    }
}

/// Handle to a side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use strand_core::{Effect, Signal};
///
/// let count = Signal::new(0);
///
/// let effect = Effect::new(move || {
///     println!("Count is: {}", count.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    id: NodeId,
    marker: PhantomData<*const ()>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new(run: impl Fn() + 'static) -> Self {
        Self::build(
            Box::new(move || {
                run();
                Ok::<(), ComputeError>(())
            }),
            None,
        )
    }

    /// Create an effect whose function may fail. Failures go to the error
    /// handler installed with [`Runtime::set_error_handler`].
    pub fn try_new<E>(run: impl Fn() -> Result<(), E> + 'static) -> Self
    where
        E: Error + 'static,
    {
        Self::build(Box::new(move || run().map_err(ComputeError::new)), None)
    }

    /// Create an effect whose re-runs are handed to `scheduler` instead of
    /// running synchronously. The first run still happens immediately.
    pub fn with_scheduler(
        run: impl Fn() + 'static,
        scheduler: impl EffectScheduler + 'static,
    ) -> Self {
        Self::build(
            Box::new(move || {
                run();
                Ok::<(), ComputeError>(())
            }),
            Some(Box::new(scheduler)),
        )
    }

    fn build(run: RunFn, scheduler: Option<Box<dyn EffectScheduler>>) -> Self {
        let state = Rc::new(EffectState {
            run,
            scheduler,
            runs: Cell::new(0),
        });
        let id = Runtime::with(|rt| rt.create_effect(state));
        Self::from_id(id)
    }

    pub(crate) fn from_id(id: NodeId) -> Self {
        Self {
            id,
            marker: PhantomData,
        }
    }

    /// Get the effect's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Run the effect if any of its dependencies changed since its last run.
    ///
    /// This is what a scheduler calls to deliver a deferred effect. Calling
    /// it on a clean or disposed effect does nothing.
    pub fn run(&self) {
        Runtime::with(|rt| rt.run_effect_if_dirty(self.id));
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again and its child effects
    /// are disposed too.
    pub fn dispose(&self) {
        Runtime::with(|rt| rt.dispose(self.id));
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !Runtime::with(|rt| rt.is_alive(self.id))
    }

    /// Whether a dependency may have changed since the last run.
    pub fn is_dirty(&self) -> bool {
        Runtime::with(|rt| rt.with_graph(|g| g.flags(self.id).needs_resolution()))
    }

    /// Get the number of times the effect has run. Zero once disposed.
    pub fn run_count(&self) -> usize {
        Runtime::with(|rt| rt.effect_run_count(self.id))
    }

    /// Get the number of dependencies, child effects included.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| rt.with_graph(|g| g.dependencies(self.id).len()))
    }

    #[cfg(test)]
    pub(crate) fn flags(&self) -> crate::graph::NodeFlags {
        Runtime::with(|rt| rt.with_graph(|g| g.flags(self.id)))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create a new effect. Shorthand for [`Effect::new`].
pub fn create_effect(run: impl Fn() + 'static) -> Effect {
    Effect::new(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
