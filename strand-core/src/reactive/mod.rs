//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives sit on top of the dependency graph in
//! [`crate::graph`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal is
//! linked to that context as a dependency. When the signal's value changes,
//! all dependents are marked.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when read after one of its dependencies actually changed. Reading a
//! computed inside another consumer makes it a dependency of that consumer.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as updating a view or logging.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a producer is read, we check if there is an
//! active consumer and, if so, link the two.
//!
//! Handles are `Copy` ids. Values and closures are owned by the per-thread
//! [`Runtime`] and freed when their node is disposed.

mod batch;
mod computed;
mod context;
mod effect;
mod runtime;
mod scheduler;
mod signal;

pub use batch::{batch, end_batch, start_batch, BatchGuard};
pub use computed::{create_computed, Computed};
pub use context::{untrack, ReactiveContext};
pub use effect::{create_effect, Effect};
pub use runtime::{ErrorHandler, Runtime, RuntimeStats};
pub use scheduler::{DeferredQueue, EffectScheduler};
pub use signal::{create_signal, Signal};
