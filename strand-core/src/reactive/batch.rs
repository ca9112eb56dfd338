//! Batching
//!
//! Inside a batch, writes still mark the graph immediately but queued effects
//! wait until the outermost batch ends. Several writes to the same signal, or
//! to signals feeding the same effect, therefore produce one run.

use std::marker::PhantomData;

use super::runtime::Runtime;

/// Keeps a batch open for as long as it lives.
///
/// Dropping the last open guard flushes queued effects. Dropping it while
/// unwinding only closes the batch.
#[derive(Debug)]
#[must_use = "the batch ends as soon as the guard is dropped"]
pub struct BatchGuard {
    marker: PhantomData<*const ()>,
}

impl BatchGuard {
    pub fn new() -> Self {
        Runtime::with(|rt| rt.enter_batch());
        Self {
            marker: PhantomData,
        }
    }
}

impl Default for BatchGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        Runtime::with(|rt| rt.exit_batch());
    }
}

/// Run `f` inside a batch.
///
/// ```rust
/// use strand_core::{batch, Effect, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// let sum = Effect::new(move || {
///     let _ = a.get() + b.get();
/// });
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(sum.run_count(), 2);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::new();
    f()
}

/// Open a batch. Must be paired with [`end_batch`].
pub fn start_batch() {
    Runtime::with(|rt| rt.enter_batch());
}

/// Close a batch opened with [`start_batch`], flushing if it was the
/// outermost one.
pub fn end_batch() {
    Runtime::with(|rt| rt.exit_batch());
}
