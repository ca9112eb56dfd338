//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal is linked to that context as a dependency.
//!
//! 2. When a signal is written with a value that differs from the current
//!    one, its subscribers are marked and reached effects are queued.
//!
//! 3. Writing an equal value does nothing at all.
//!
//! # Memory Layout
//!
//! A `Signal<T>` handle is just a node id (8 bytes) and is `Copy`. The value
//! and the equality function live in the runtime until the signal is
//! disposed.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::debug;

use super::runtime::{NodeBody, Runtime};
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, NodeKind};

pub(crate) type EqualsFn<T> = Box<dyn Fn(&T, &T) -> bool>;

/// Runtime-side storage of a signal.
pub(crate) struct SignalState<T> {
    value: RefCell<T>,
    equals: EqualsFn<T>,
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use strand_core::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    id: NodeId,
    marker: PhantomData<(fn() -> T, *const ())>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal compared with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(value, |a: &T, b: &T| a == b)
    }

    /// Create a new signal with a custom equality check. A write whose value
    /// is equal to the current one is ignored.
    pub fn with_equality(value: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        let state = SignalState {
            value: RefCell::new(value),
            equals: Box::new(equals),
        };
        let id = Runtime::with(|rt| rt.create(NodeKind::Signal, NodeBody::Signal(Rc::new(state))));
        Self {
            id,
            marker: PhantomData,
        }
    }

    /// Get the signal's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, registering a dependency on the running
    /// computation.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("Signal::get: {err}"),
        }
    }

    /// Get the current value, or an error if the signal has been disposed.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        super::untrack(|| self.get())
    }

    /// Apply `f` to a reference to the current value, registering a
    /// dependency.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        Runtime::with(|rt| {
            let state = rt
                .signal_state::<T>(self.id)
                .ok_or(ReactiveError::Disposed(self.id))?;
            rt.track_read(self.id);
            let value = state.value.borrow();
            Ok(f(&value))
        })
    }

    /// Set a new value. Subscribers are notified only if the value differs
    /// from the current one. Writing to a disposed signal is ignored.
    pub fn set(&self, value: T) {
        Runtime::with(|rt| {
            let Some(state) = rt.signal_state::<T>(self.id) else {
                debug!(id = %self.id, "write to disposed signal ignored");
                return;
            };
            {
                let mut current = state.value.borrow_mut();
                if (state.equals)(&current, &value) {
                    return;
                }
                *current = value;
            }
            rt.signal_changed(self.id);
        });
    }

    /// Replace the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = Runtime::with(|rt| {
            rt.signal_state::<T>(self.id)
                .map(|state| f(&state.value.borrow()))
        });
        if let Some(next) = next {
            self.set(next);
        }
    }

    /// Dispose the signal. Its subscribers stop depending on it; further
    /// reads fail and further writes are ignored.
    pub fn dispose(&self) {
        Runtime::with(|rt| rt.dispose(self.id));
    }

    /// Whether the signal has been disposed.
    pub fn is_disposed(&self) -> bool {
        !Runtime::with(|rt| rt.is_alive(self.id))
    }

    /// Number of consumers currently depending on this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| rt.with_graph(|g| g.subscribers(self.id).len()))
    }

    /// Bumped on every write that changed the value.
    pub fn version(&self) -> u64 {
        Runtime::with(|rt| rt.with_graph(|g| g.node(self.id).map_or(0, |n| n.version)))
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for Signal<T> {}

impl<T: 'static> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: 'static> Eq for Signal<T> {}

impl<T: 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("version", &self.version())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a new signal. Shorthand for [`Signal::new`].
pub fn create_signal<T: PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_basic() {
        let signal = Signal::new(42);
        assert_eq!(signal.get(), 42);

        signal.set(100);
        assert_eq!(signal.get(), 100);
    }

    #[test]
    fn test_signal_update() {
        let signal = Signal::new(10);
        signal.update(|x| x * 2);
        assert_eq!(signal.get(), 20);
    }

    #[test]
    fn equal_write_keeps_version() {
        let signal = Signal::new(String::from("a"));
        assert_eq!(signal.version(), 0);

        signal.set(String::from("a"));
        assert_eq!(signal.version(), 0);

        signal.set(String::from("b"));
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn custom_equality() {
        // Only the integer part matters.
        let signal = Signal::with_equality(1.2_f64, |a, b| a.trunc() == b.trunc());
        signal.set(1.9);
        assert_eq!(signal.get(), 1.2);
        signal.set(2.1);
        assert_eq!(signal.get(), 2.1);
    }

    #[test]
    fn disposed_signal() {
        let signal = Signal::new(1);
        signal.dispose();

        assert!(signal.is_disposed());
        assert!(matches!(signal.try_get(), Err(ReactiveError::Disposed(_))));
        signal.set(2);
        signal.dispose();
    }

    #[test]
    fn try_with_borrows() {
        let signal = create_signal(vec![1, 2, 3]);
        assert_eq!(signal.try_with(|v| v.len()).unwrap(), 3);
    }
}
