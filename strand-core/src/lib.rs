//! Strand Core
//!
//! This crate provides a fine-grained reactive runtime: mutable signals,
//! lazily cached computeds and eagerly re-running effects, wired together by
//! automatic dependency tracking.
//!
//! It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - A push-pull dependency graph that marks on write and recomputes on read
//! - Batching and host-controlled effect scheduling
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Node/link storage, propagation and dirty checking
//! - `config`: Runtime tunables
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use strand_core::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new(move || count.get() * 2);
//!
//! // Create an effect
//! Effect::new(move || {
//!     println!("Count: {}, Doubled: {}", count.get(), doubled.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{ComputeError, ReactiveError, Result};
pub use reactive::{
    batch, create_computed, create_effect, create_signal, end_batch, start_batch, untrack,
    BatchGuard, Computed, DeferredQueue, Effect, EffectScheduler, Runtime, RuntimeStats, Signal,
};

/// Apply `config` to this thread's runtime.
pub fn configure(config: RuntimeConfig) {
    Runtime::configure(config);
}

/// Install the handler for effect failures and flush overruns on this thread.
pub fn set_error_handler(handler: impl Fn(&ReactiveError) + 'static) {
    Runtime::set_error_handler(handler);
}

/// Size of this thread's reactive graph.
pub fn stats() -> RuntimeStats {
    Runtime::stats()
}
