//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. Creating a computed runs nothing. The first read computes and caches
//!    the result.
//!
//! 2. A write anywhere upstream only marks the computed: `DIRTY` when a direct
//!    dependency changed, `PENDING_COMPUTED` when a computed further up might
//!    have.
//!
//! 3. On the next read, a pending computed walks its dependencies first. If
//!    none of them actually produced a new value, the cache is kept and the
//!    function does not run.
//!
//! 4. Failures are cached like values. Every read returns the same error
//!    instance until a dependency changes.
//!
//! # Why This Matters
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay marked (no wasted work)

use std::any::Any;
use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::trace;

use super::runtime::{ComputedBody, NodeBody, Runtime};
use super::signal::EqualsFn;
use crate::error::{ComputeError, ReactiveError, Result};
use crate::graph::{NodeId, NodeKind};

type ComputeFn<T> = Box<dyn Fn() -> std::result::Result<T, ComputeError>>;

struct ComputedState<T> {
    compute: ComputeFn<T>,
    value: RefCell<Option<std::result::Result<T, ComputeError>>>,
    equals: EqualsFn<T>,
}

impl<T: 'static> ComputedBody for ComputedState<T> {
    fn recompute(&self, runtime: &Runtime, id: NodeId) -> bool {
        let next = {
            let _run = runtime.begin_run(id);
            (self.compute)()
        };

        let mut slot = self.value.borrow_mut();
        let changed = match (slot.as_ref(), &next) {
            (Some(Ok(old)), Ok(new)) => !(self.equals)(old, new),
            _ => true,
        };
        if changed {
            *slot = Some(next);
            drop(slot);
            let version = runtime.graph.borrow_mut().bump_version(id);
            trace!(%id, version, "computed value changed");
        }
        changed
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// ```rust
/// use strand_core::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new(move || count.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    id: NodeId,
    marker: PhantomData<(fn() -> T, *const ())>,
}

impl<T: 'static> Computed<T> {
    /// Create a new computed compared with `PartialEq`.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::build(
            Box::new(move || Ok::<T, ComputeError>(compute())),
            Box::new(|a: &T, b: &T| a == b),
        )
    }

    /// Create a computed whose function may fail. The error is returned from
    /// every read until a dependency changes.
    pub fn try_new<E>(compute: impl Fn() -> std::result::Result<T, E> + 'static) -> Self
    where
        T: PartialEq,
        E: Error + 'static,
    {
        Self::build(
            Box::new(move || compute().map_err(ComputeError::new)),
            Box::new(|a: &T, b: &T| a == b),
        )
    }

    /// Create a computed with a custom equality check. When a recomputation
    /// yields a value equal to the cached one, subscribers are not told.
    pub fn with_equality(
        compute: impl Fn() -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self::build(Box::new(move || Ok::<T, ComputeError>(compute())), Box::new(equals))
    }

    fn build(compute: ComputeFn<T>, equals: EqualsFn<T>) -> Self {
        let state = ComputedState {
            compute,
            value: RefCell::new(None),
            equals,
        };
        let id = Runtime::with(|rt| {
            rt.create(NodeKind::Computed, NodeBody::Computed(Rc::new(state)))
        });
        Self {
            id,
            marker: PhantomData,
        }
    }

    /// Get the computed's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing first if needed.
    ///
    /// # Panics
    ///
    /// Panics if the computation failed, if the computed was disposed or if
    /// it was read during its own computation. Use [`Computed::try_get`] to
    /// handle those cases.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("Computed::get: {err}"),
        }
    }

    /// Get the current value or the cached failure.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get the current value without registering a dependency. Panics like
    /// [`Computed::get`].
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        super::untrack(|| self.get())
    }

    /// Apply `f` to a reference to the up-to-date value.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        Runtime::with(|rt| {
            rt.resolve_computed(self.id)?;
            rt.track_read(self.id);

            let body = rt
                .computed_body(self.id)
                .ok_or(ReactiveError::Disposed(self.id))?;
            let state = body
                .as_any()
                .downcast_ref::<ComputedState<T>>()
                .ok_or(ReactiveError::Disposed(self.id))?;
            let slot = state.value.borrow();
            match slot.as_ref() {
                Some(Ok(value)) => Ok(f(value)),
                Some(Err(err)) => Err(ReactiveError::Computation(err.clone())),
                // Only while the first computation is still on the stack.
                None => Err(ReactiveError::Cycle(self.id)),
            }
        })
    }

    /// Dispose the computed. It unsubscribes from its dependencies and its
    /// subscribers stop depending on it.
    pub fn dispose(&self) {
        Runtime::with(|rt| rt.dispose(self.id));
    }

    /// Whether the computed has been disposed.
    pub fn is_disposed(&self) -> bool {
        !Runtime::with(|rt| rt.is_alive(self.id))
    }

    /// Number of producers read by the last computation.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| rt.with_graph(|g| g.dependencies(self.id).len()))
    }

    /// Number of consumers currently depending on this computed.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| rt.with_graph(|g| g.subscribers(self.id).len()))
    }

    /// Bumped on every recomputation that changed the cached value.
    pub fn version(&self) -> u64 {
        Runtime::with(|rt| rt.with_graph(|g| g.node(self.id).map_or(0, |n| n.version)))
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for Computed<T> {}

impl<T: 'static> PartialEq for Computed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: 'static> Eq for Computed<T> {}

impl<T: 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id)
            .field("version", &self.version())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Create a new computed. Shorthand for [`Computed::new`].
pub fn create_computed<T: PartialEq + 'static>(compute: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(compute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::cell::Cell;

    #[test]
    fn test_memo_basic() {
        let compute_count = Rc::new(Cell::new(0));
        let count = Rc::clone(&compute_count);

        let memo = Computed::new(move || {
            count.set(count.get() + 1);
            42
        });

        // Not computed yet
        assert_eq!(compute_count.get(), 0);

        // First access computes
        assert_eq!(memo.get(), 42);
        assert_eq!(compute_count.get(), 1);

        // Second access uses cache
        assert_eq!(memo.get(), 42);
        assert_eq!(compute_count.get(), 1);
    }

    #[test]
    fn recomputes_after_dependency_change() {
        let s = Signal::new(1);
        let c = Computed::new(move || s.get() * 10);

        assert_eq!(c.get(), 10);
        s.set(2);
        assert_eq!(c.get(), 20);
        assert_eq!(c.version(), 2);
        assert_eq!(c.dependency_count(), 1);
    }

    #[test]
    fn equal_result_keeps_version() {
        let s = Signal::new(1);
        let parity = Computed::new(move || s.get() % 2);

        assert_eq!(parity.get(), 1);
        s.set(3);
        assert_eq!(parity.get(), 1);
        assert_eq!(parity.version(), 1);
    }

    #[test]
    fn chain_skips_unchanged_middle() {
        let runs = Rc::new(Cell::new(0));
        let s = Signal::new(2);
        let parity = Computed::new(move || s.get() % 2);
        let runs_clone = Rc::clone(&runs);
        let label = Computed::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            if parity.get() == 0 { "even" } else { "odd" }
        });

        assert_eq!(label.get(), "even");
        s.set(4);
        assert_eq!(label.get(), "even");
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn dispose_computed() {
        let s = Signal::new(1);
        let c = Computed::new(move || s.get());
        assert_eq!(c.get(), 1);
        assert_eq!(s.subscriber_count(), 1);

        c.dispose();
        assert!(c.is_disposed());
        assert_eq!(s.subscriber_count(), 0);
        assert!(matches!(c.try_get(), Err(ReactiveError::Disposed(_))));
    }

    #[test]
    fn untracked_read_does_not_link() {
        let s = Signal::new(1);
        let inner = Computed::new(move || s.get());
        let outer = Computed::new(move || inner.get_untracked() + 1);

        assert_eq!(outer.get(), 2);
        assert_eq!(outer.dependency_count(), 0);
        assert_eq!(inner.subscriber_count(), 0);
    }
}
