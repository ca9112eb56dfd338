//! Graph Nodes
//!
//! This module defines the records that live in the dependency graph: the
//! nodes themselves and the links connecting a producer to a consumer.

use std::fmt;

use super::arena::ArenaKey;
use super::flags::NodeFlags;

/// Identifier of a node in the dependency graph.
///
/// Ids are generation-tagged: once a node is disposed its id never resolves
/// again, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index of the node.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when the node was created.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl ArenaKey for NodeId {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    fn index(self) -> u32 {
        self.index
    }

    fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Identifier of a link in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId {
    index: u32,
    generation: u32,
}

impl ArenaKey for LinkId {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    fn index(self) -> u32 {
        self.index
    }

    fn generation(self) -> u32 {
        self.generation
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). Only ever a producer.
    Signal,

    /// A derived node. Reads producers and is read by consumers.
    Computed,

    /// A side-effecting consumer. Only nested effects subscribe to it.
    Effect,
}

impl NodeKind {
    /// Flags a freshly created node of this kind starts with.
    pub fn initial_flags(self) -> NodeFlags {
        match self {
            NodeKind::Signal => NodeFlags::empty(),
            // Starts dirty so the first read computes.
            NodeKind::Computed => NodeFlags::COMPUTED | NodeFlags::DIRTY,
            NodeKind::Effect => NodeFlags::EFFECT,
        }
    }
}

/// One producer -> consumer edge.
///
/// A link sits in two lists at once: the producer's doubly linked subscriber
/// list and the consumer's singly linked dependency list.
#[derive(Debug, Clone)]
pub struct Link {
    /// The producer that was read.
    pub dep: NodeId,
    /// The consumer that read it.
    pub sub: NodeId,
    /// Previous entry in `dep`'s subscriber list.
    pub prev_sub: Option<LinkId>,
    /// Next entry in `dep`'s subscriber list.
    pub next_sub: Option<LinkId>,
    /// Next entry in `sub`'s dependency list.
    pub next_dep: Option<LinkId>,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct ReactiveNode {
    kind: NodeKind,

    /// Kind and state bits.
    pub flags: NodeFlags,

    /// Bumped every time the node's value changes.
    pub version: u64,

    /// Head of the dependency list (producers this node read).
    pub deps: Option<LinkId>,

    /// Tracking cursor: the last dependency confirmed in the current run.
    pub deps_tail: Option<LinkId>,

    /// Head of the subscriber list (consumers that read this node).
    pub subs: Option<LinkId>,

    /// Tail of the subscriber list.
    pub subs_tail: Option<LinkId>,
}

impl ReactiveNode {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            flags: kind.initial_flags(),
            version: 0,
            deps: None,
            deps_tail: None,
            subs: None,
            subs_tail: None,
        }
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Whether anything subscribes to this node.
    pub fn has_subscribers(&self) -> bool {
        self.subs.is_some()
    }
}
