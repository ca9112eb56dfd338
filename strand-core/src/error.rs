//! Error Types

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::graph::NodeId;

/// Errors surfaced by the reactive runtime.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactiveError {
    /// The node was disposed and can no longer be read.
    #[error("node {0} has been disposed")]
    Disposed(NodeId),

    /// A computed read itself, directly or through other computeds, while it
    /// was computing.
    #[error("cyclic computation: node {0} was read while it was computing")]
    Cycle(NodeId),

    /// A computed's function failed. The failure is cached until a
    /// dependency changes.
    #[error(transparent)]
    Computation(#[from] ComputeError),

    /// An effect's function failed.
    #[error("effect {id} failed: {source}")]
    Effect {
        /// The effect that failed.
        id: NodeId,
        /// What it failed with.
        #[source]
        source: ComputeError,
    },

    /// A single flush delivered more effects than the configured limit.
    #[error("effect flush exceeded {limit} deliveries; {dropped} queued effects were discarded")]
    FlushLimitExceeded {
        /// The configured limit.
        limit: usize,
        /// Effects still queued when the flush stopped.
        dropped: usize,
    },
}

/// A failure produced by user code inside a computed or an effect.
///
/// Cloning shares the underlying error, so every read of a failed computed
/// hands out the same instance (see [`ComputeError::ptr_eq`]).
#[derive(Clone)]
pub struct ComputeError(Rc<dyn Error + 'static>);

impl ComputeError {
    /// Wrap an error.
    ///
    /// A `ComputeError` or a [`ReactiveError::Computation`] is unwrapped
    /// instead, so a failure read through a chain of computeds stays the
    /// same instance.
    pub fn new<E: Error + 'static>(error: E) -> Self {
        let boxed: Box<dyn Error + 'static> = Box::new(error);
        let boxed = match boxed.downcast::<ComputeError>() {
            Ok(existing) => return *existing,
            Err(boxed) => boxed,
        };
        match boxed.downcast::<ReactiveError>() {
            Ok(reactive) => match *reactive {
                ReactiveError::Computation(inner) => inner,
                other => Self(Rc::new(other)),
            },
            Err(boxed) => Self(Rc::from(boxed)),
        }
    }

    /// An error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Rc::new(Message(message.into())))
    }

    /// Whether both values share the same underlying error.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The wrapped error.
    pub fn get_ref(&self) -> &(dyn Error + 'static) {
        &*self.0
    }

    /// Attempt to view the wrapped error as a concrete type.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Debug for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error for ComputeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

/// Convenience alias for results returned by the runtime.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
