//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the dependency graph, the values and closures behind
//! every node, the batch depth and the flush loop.
//!
//! # How It Works
//!
//! 1. Creating a node adds it to the graph and stores its body (value,
//!    function, scheduler) in the registry under the node's id.
//!
//! 2. Reading a producer inside a running consumer links the two.
//!
//! 3. Writing a signal bumps its version and propagates marks through the
//!    graph. Reached effects are appended to the notification buffer.
//!
//! 4. When the outermost batch ends, the buffer is flushed in FIFO order.
//!    Effects written to during the flush are appended to the same buffer
//!    and picked up by the same loop.
//!
//! 5. Computeds are lazy: they only recompute when read, and only if the
//!    dirty check finds a dependency whose value actually changed.
//!
//! # Thread Safety
//!
//! There is one runtime per thread, held in thread-local storage. Handles
//! are not `Send`; a host that needs the graph on several threads must pin it
//! to one of them.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use super::batch::BatchGuard;
use super::context::ReactiveContext;
use super::effect::{Effect, EffectState};
use super::signal::SignalState;
use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{self, Graph, NodeFlags, NodeId, NodeKind};

/// Type-erased behaviour of a computed node.
pub(crate) trait ComputedBody {
    /// Re-run the computation, store the result and report whether the
    /// cached value changed.
    fn recompute(&self, runtime: &Runtime, id: NodeId) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// What the registry stores for each node.
#[derive(Clone)]
pub(crate) enum NodeBody {
    Signal(Rc<dyn Any>),
    Computed(Rc<dyn ComputedBody>),
    Effect(Rc<EffectState>),
}

/// Host callback for failures that have no caller to return to.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

/// Snapshot of the runtime's size, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Live nodes.
    pub nodes: usize,
    /// Live producer/consumer links.
    pub links: usize,
    /// Entries in the notification buffer.
    pub queued_effects: usize,
    /// Current batch nesting.
    pub batch_depth: u32,
}

/// The per-thread reactive runtime.
pub struct Runtime {
    pub(crate) graph: RefCell<Graph>,
    registry: RefCell<IndexMap<NodeId, NodeBody>>,
    batch_depth: Cell<u32>,
    flushing: Cell<bool>,
    config: RefCell<RuntimeConfig>,
    error_handler: RefCell<Option<ErrorHandler>>,
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Brackets one run of a consumer: tracking flag, cursor and context.
pub(crate) struct RunGuard<'a> {
    runtime: &'a Runtime,
    id: NodeId,
    _ctx: ReactiveContext,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let removed = self.runtime.graph.borrow_mut().end_tracking(self.id);
        self.runtime.release(removed);
    }
}

struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            registry: RefCell::new(IndexMap::new()),
            batch_depth: Cell::new(0),
            flushing: Cell::new(false),
            config: RefCell::new(RuntimeConfig::default()),
            error_handler: RefCell::new(None),
        }
    }

    /// Run `f` with this thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    // ------------------------------------------------------------------
    // Host-facing settings
    // ------------------------------------------------------------------

    /// Apply a configuration to this thread's runtime.
    pub fn configure(config: RuntimeConfig) {
        Self::with(|rt| {
            rt.graph.borrow_mut().trace_marks = config.trace_propagation;
            debug!(?config, "runtime configured");
            *rt.config.borrow_mut() = config;
        });
    }

    /// The configuration currently in effect on this thread.
    pub fn config() -> RuntimeConfig {
        Self::with(|rt| rt.config.borrow().clone())
    }

    /// Install the handler that receives effect failures and flush overruns.
    pub fn set_error_handler(handler: impl Fn(&ReactiveError) + 'static) {
        Self::with(|rt| *rt.error_handler.borrow_mut() = Some(Rc::new(handler)));
    }

    /// Remove the error handler; failures are logged instead.
    pub fn clear_error_handler() {
        Self::with(|rt| *rt.error_handler.borrow_mut() = None);
    }

    /// Current size of this thread's graph.
    pub fn stats() -> RuntimeStats {
        Self::with(|rt| {
            let graph = rt.graph.borrow();
            RuntimeStats {
                nodes: graph.node_count(),
                links: graph.link_count(),
                queued_effects: graph.queued_len(),
                batch_depth: rt.batch_depth.get(),
            }
        })
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub(crate) fn create(&self, kind: NodeKind, body: NodeBody) -> NodeId {
        let id = self.graph.borrow_mut().add_node(kind);
        self.registry.borrow_mut().insert(id, body);
        debug!(%id, ?kind, "node created");
        id
    }

    pub(crate) fn with_graph<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(&self.graph.borrow())
    }

    pub(crate) fn is_alive(&self, id: NodeId) -> bool {
        self.graph.borrow().contains(id)
    }

    fn body(&self, id: NodeId) -> Option<NodeBody> {
        self.registry.borrow().get(&id).cloned()
    }

    pub(crate) fn signal_state<T: 'static>(&self, id: NodeId) -> Option<Rc<SignalState<T>>> {
        match self.body(id)? {
            NodeBody::Signal(any) => any.downcast::<SignalState<T>>().ok(),
            _ => None,
        }
    }

    pub(crate) fn computed_body(&self, id: NodeId) -> Option<Rc<dyn ComputedBody>> {
        match self.body(id)? {
            NodeBody::Computed(body) => Some(body),
            _ => None,
        }
    }

    fn effect_state(&self, id: NodeId) -> Option<Rc<EffectState>> {
        match self.body(id)? {
            NodeBody::Effect(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn effect_run_count(&self, id: NodeId) -> usize {
        self.effect_state(id).map_or(0, |state| state.run_count())
    }

    /// Dispose a node and everything that only existed to serve it.
    pub(crate) fn dispose(&self, id: NodeId) {
        let removed = self.graph.borrow_mut().remove_node(id);
        if removed.is_empty() {
            trace!(%id, "dispose of a dead node ignored");
            return;
        }
        self.release(removed);
    }

    /// Drop the bodies of removed nodes, outside of any registry borrow.
    fn release(&self, removed: Vec<NodeId>) {
        if removed.is_empty() {
            return;
        }
        let bodies: Vec<NodeBody> = {
            let mut registry = self.registry.borrow_mut();
            removed
                .iter()
                .filter_map(|id| registry.swap_remove(id))
                .collect()
        };
        for id in &removed {
            debug!(%id, "node disposed");
        }
        drop(bodies);
    }

    // ------------------------------------------------------------------
    // Reads and writes
    // ------------------------------------------------------------------

    /// Link `dep` to the running consumer, if any.
    pub(crate) fn track_read(&self, dep: NodeId) {
        if let Some(sub) = ReactiveContext::current_consumer() {
            self.graph.borrow_mut().link(dep, sub);
        }
    }

    /// A signal's value changed: bump, propagate, and flush unless batched.
    pub(crate) fn signal_changed(&self, id: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            graph.bump_version(id);
            if let Some(head) = graph.node(id).and_then(|n| n.subs) {
                graph.propagate(head);
            }
        }
        if self.batch_depth.get() == 0 {
            self.flush();
        }
    }

    /// Start a run of `id`.
    pub(crate) fn begin_run(&self, id: NodeId) -> RunGuard<'_> {
        self.graph.borrow_mut().start_tracking(id);
        RunGuard {
            runtime: self,
            id,
            _ctx: ReactiveContext::enter(id),
        }
    }

    /// Bring a computed's cached value up to date.
    pub(crate) fn resolve_computed(&self, id: NodeId) -> Result<(), ReactiveError> {
        let flags = {
            let graph = self.graph.borrow();
            if !graph.contains(id) {
                return Err(ReactiveError::Disposed(id));
            }
            graph.flags(id)
        };
        if flags.is_tracking() {
            return Err(ReactiveError::Cycle(id));
        }

        if flags.contains(NodeFlags::DIRTY)
            || (flags.contains(NodeFlags::PENDING_COMPUTED) && self.check_dirty(id))
        {
            if self.update_computed(id) {
                let mut graph = self.graph.borrow_mut();
                if let Some(head) = graph.node(id).and_then(|n| n.subs) {
                    graph.shallow_propagate(head);
                }
            }
        } else if flags.contains(NodeFlags::PENDING_COMPUTED) {
            self.graph
                .borrow_mut()
                .clear_flags(id, NodeFlags::PENDING_COMPUTED);
        }
        Ok(())
    }

    fn check_dirty(&self, id: NodeId) -> bool {
        graph::check_dirty(&self.graph, id, &mut |dep| self.update_computed(dep))
    }

    fn update_computed(&self, id: NodeId) -> bool {
        match self.computed_body(id) {
            Some(body) => body.recompute(self, id),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    /// Register an effect, attach it to a running parent effect and run it.
    pub(crate) fn create_effect(&self, state: Rc<EffectState>) -> NodeId {
        let id = self.create(NodeKind::Effect, NodeBody::Effect(Rc::clone(&state)));
        if let Some(parent) = ReactiveContext::current_consumer() {
            let mut graph = self.graph.borrow_mut();
            if graph.flags(parent).contains(NodeFlags::EFFECT) {
                graph.link(id, parent);
            }
        }
        self.run_effect(id, &state);
        id
    }

    /// Deliver a queued effect. Returns `false` when delivery was handed to
    /// the effect's scheduler instead of running now.
    fn notify_effect(&self, id: NodeId) -> bool {
        let Some(state) = self.effect_state(id) else {
            return true;
        };
        if let Some(scheduler) = state.scheduler() {
            trace!(%id, "effect handed to scheduler");
            scheduler.schedule(Effect::from_id(id));
            return false;
        }
        self.run_effect_if_dirty(id);
        true
    }

    /// Run the effect if one of its dependencies changed value; otherwise
    /// settle its pending marks and deliver any dirty child effects.
    pub(crate) fn run_effect_if_dirty(&self, id: NodeId) {
        let Some(state) = self.effect_state(id) else {
            return;
        };
        let flags = self.graph.borrow().flags(id);
        if flags.contains(NodeFlags::DIRTY)
            || (flags.contains(NodeFlags::PENDING_COMPUTED) && self.check_dirty(id))
        {
            self.run_effect(id, &state);
        } else {
            self.graph
                .borrow_mut()
                .clear_flags(id, NodeFlags::PENDING_COMPUTED | NodeFlags::NOTIFIED);
            self.deliver_pending_children(id);
        }
    }

    fn deliver_pending_children(&self, id: NodeId) {
        let children: Vec<NodeId> = {
            let mut graph = self.graph.borrow_mut();
            if !graph.flags(id).contains(NodeFlags::PENDING_EFFECT) {
                return;
            }
            graph.clear_flags(id, NodeFlags::PENDING_EFFECT);
            graph
                .dependencies(id)
                .into_iter()
                .filter(|&dep| {
                    let flags = graph.flags(dep);
                    flags.contains(NodeFlags::EFFECT) && flags.is_propagated()
                })
                .collect()
        };
        for child in children {
            if !self.notify_effect(child) {
                self.graph.borrow_mut().clear_flags(child, NodeFlags::NOTIFIED);
            }
        }
    }

    fn run_effect(&self, id: NodeId, state: &EffectState) {
        // Writes made by the effect are delivered after it returns.
        let _batch = BatchGuard::new();
        let result = {
            let _run = self.begin_run(id);
            state.invoke()
        };
        if let Err(source) = result {
            self.report(ReactiveError::Effect { id, source });
        }
    }

    // ------------------------------------------------------------------
    // Batching and delivery
    // ------------------------------------------------------------------

    pub(crate) fn enter_batch(&self) {
        self.batch_depth.set(self.batch_depth.get() + 1);
    }

    pub(crate) fn exit_batch(&self) {
        let depth = self.batch_depth.get();
        if depth == 0 {
            warn!("end_batch called without a matching start_batch");
            return;
        }
        self.batch_depth.set(depth - 1);
        if depth == 1 && !std::thread::panicking() {
            self.flush();
        }
    }

    /// Drain the notification buffer. Re-entrant calls return immediately;
    /// the outer loop picks up whatever they would have delivered.
    pub(crate) fn flush(&self) {
        if self.flushing.replace(true) {
            return;
        }
        let _flushing = FlushGuard(&self.flushing);
        let limit = self.config.borrow().flush_limit;
        let mut delivered = 0usize;

        loop {
            let next = self.graph.borrow_mut().dequeue();
            let Some(id) = next else { break };
            if !self.is_alive(id) {
                trace!(%id, "skipping disposed effect");
                continue;
            }

            if let Some(limit) = limit.filter(|&limit| delivered >= limit) {
                let dropped = {
                    let mut graph = self.graph.borrow_mut();
                    graph.clear_flags(id, NodeFlags::NOTIFIED);
                    1 + graph.clear_queue()
                };
                warn!(limit, dropped, "flush limit exceeded");
                self.report(ReactiveError::FlushLimitExceeded { limit, dropped });
                break;
            }

            delivered += 1;
            trace!(%id, "delivering effect");
            if !self.notify_effect(id) {
                self.graph.borrow_mut().clear_flags(id, NodeFlags::NOTIFIED);
            }
        }

        if delivered > 0 {
            debug!(delivered, "flush complete");
        }
    }

    /// Hand an error to the host handler, or log it.
    pub(crate) fn report(&self, err: ReactiveError) {
        let handler = self.error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(&err),
            None => error!(error = %err, "unhandled reactive error"),
        }
    }
}
