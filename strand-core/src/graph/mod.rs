//! Dependency Graph
//!
//! This module implements the graph that records which consumers read which
//! producers, and the algorithms that move change information through it.
//!
//! # Overview
//!
//! - Nodes represent signals, computeds and effects.
//! - Links represent reads: one link per producer/consumer pair, threaded
//!   through the producer's subscriber list and the consumer's dependency
//!   list at the same time.
//!
//! A write pushes cheap marks (`DIRTY`, `PENDING_*`) down the subscriber
//! lists. A read pulls: [`check_dirty`] walks dependency lists and recomputes
//! only what actually changed.
//!
//! # Design Decisions
//!
//! 1. Nodes and links live in generational arenas rather than behind
//!    pointers. A stale id resolves to nothing instead of to a reused slot.
//!
//! 2. Both lists are intrusive, so appending and unlinking are O(1) at known
//!    positions and a stable re-run allocates nothing.
//!
//! 3. The graph never calls user code. Everything here is plain data
//!    manipulation; the runtime supplies recomputation as a callback.

mod arena;
mod dirty;
mod flags;
mod links;
mod node;
mod propagate;

pub use arena::{Arena, ArenaKey};
pub use dirty::check_dirty;
pub use flags::NodeFlags;
pub use links::Graph;
pub use node::{Link, LinkId, NodeId, NodeKind, ReactiveNode};
