//! Event dispatcher: gating, queueing and nested dispatch contexts
//!
//! # Gating
//!
//! While at least one gate is closed, queued-mode dispatches are deferred.
//! Processing an event closes a gate for its duration, so events sent from
//! callbacks are queued behind it. Opening the last gate drains the queue.
//!
//! # Drain order
//!
//! Draining swaps the live queue for an empty one before processing. Events
//! enqueued while an event is processed therefore land in the fresh queue,
//! which is drained as soon as that event's gate opens, before the rest of
//! the original queue.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tributary_config::DispatcherConfig;

use super::path::PathPool;
use super::propagate::execute_default_action;
use super::strategy::{DefaultDispatchingStrategy, DispatchingStrategy};
use crate::coordinator::EventCoordinator;
use crate::error::Result;
use crate::events::{AnyEvent, EventHandle};
use crate::pool::ObjectPool;

/// When a dispatch runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Run now unless a gate is closed, otherwise queue
    #[default]
    Queued,
    /// Always run now
    Immediate,
}

struct EventRecord {
    event: EventHandle,
    coordinator: Weak<EventCoordinator>,
}

type EventQueue = VecDeque<EventRecord>;

struct DispatchContext {
    gate_count: u32,
    queue: EventQueue,
}

/// Routes events through strategies, deferring them while gates are closed
pub struct EventDispatcher {
    strategies: Vec<Box<dyn DispatchingStrategy>>,
    queue: RefCell<EventQueue>,
    gate_count: Cell<u32>,
    contexts: RefCell<Vec<DispatchContext>>,
    queue_pool: RefCell<ObjectPool<EventQueue>>,
    paths: PathPool,
    immediate: bool,
    processing_events: Cell<bool>,
}

impl EventDispatcher {
    /// Create a dispatcher consulting `strategies` in order
    pub fn new(strategies: Vec<Box<dyn DispatchingStrategy>>) -> Self {
        Self::with_config(strategies, &DispatcherConfig::default())
    }

    pub fn with_config(strategies: Vec<Box<dyn DispatchingStrategy>>, config: &DispatcherConfig) -> Self {
        Self {
            strategies,
            queue: RefCell::new(VecDeque::new()),
            gate_count: Cell::new(0),
            contexts: RefCell::new(Vec::new()),
            queue_pool: RefCell::new(ObjectPool::new(config.queue_pool_capacity)),
            paths: PathPool::new(
                config.path_pool_capacity,
                config.path_depth_hint,
                config.target_count_hint,
            ),
            immediate: config.immediate,
            processing_events: Cell::new(false),
        }
    }

    /// Dispatcher with only the standard propagation strategy
    pub fn create_default() -> Self {
        Self::new(vec![Box::new(DefaultDispatchingStrategy)])
    }

    /// Pool the propagation paths are taken from
    pub fn paths(&self) -> &PathPool {
        &self.paths
    }

    /// Whether gates are ignored entirely
    pub fn dispatch_immediately(&self) -> bool {
        self.immediate
    }

    /// Whether a queue drain is in progress
    pub fn is_processing_events(&self) -> bool {
        self.processing_events.get()
    }

    /// Number of closed gates in the current context
    pub fn gate_count(&self) -> u32 {
        self.gate_count.get()
    }

    /// Events waiting in the current context's queue
    pub fn queued_len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Number of pushed dispatch contexts
    pub fn context_depth(&self) -> usize {
        self.contexts.borrow().len()
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Dispatch `event` now, or queue it while a gate is closed
    ///
    /// Queued events are acquired until they have been processed.
    ///
    /// # Panics
    ///
    /// Panics if `event` was already dispatched since its last init, or is
    /// the event currently being processed.
    pub fn dispatch(
        &self,
        event: &EventHandle,
        coordinator: &Rc<EventCoordinator>,
        mode: DispatchMode,
    ) -> Result<()> {
        {
            let Ok(mut evt) = event.try_borrow_mut() else {
                panic!("event is already being dispatched; send a fresh instance");
            };
            evt.base_mut().mark_received_by_dispatcher();
        }

        if self.gate_count.get() == 0 || self.immediate || mode == DispatchMode::Immediate {
            self.process_event(event, coordinator)
        } else {
            event.acquire();
            self.queue.borrow_mut().push_back(EventRecord {
                event: event.clone(),
                coordinator: Rc::downgrade(coordinator),
            });
            tracing::debug!(
                event_id = event.event_id(),
                event_type = %event.event_type(),
                queued = self.queued_len(),
                "Event queued behind closed gate"
            );
            Ok(())
        }
    }

    fn process_event(&self, event: &EventHandle, coordinator: &Rc<EventCoordinator>) -> Result<()> {
        let gate = GateGuard::close(self);
        let result = {
            let mut evt = event.borrow_mut();
            self.process_event_inner(&mut *evt, coordinator)
        };
        let drained = gate.open();

        match (result, drained) {
            (Err(err), Err(drain_err)) => {
                tracing::error!(error = %drain_err, "Queued dispatch failed after an earlier failure");
                Err(err)
            }
            (result, drained) => result.and(drained),
        }
    }

    fn process_event_inner(&self, evt: &mut dyn AnyEvent, coordinator: &Rc<EventCoordinator>) -> Result<()> {
        tracing::trace!(
            event_id = evt.base().event_id(),
            event_type = %evt.event_type(),
            "Processing event"
        );

        if !evt.base().is_dispatch_stopped() && !evt.base().is_propagation_stopped() {
            if let Err(err) = self.apply_dispatching_strategies(evt, coordinator) {
                if let Some(path) = evt.base_mut().take_path() {
                    self.paths.release(path);
                }
                return Err(err);
            }
        }

        // A strategy may have bypassed path propagation; default actions still need a path
        if evt.base().path().is_none() && evt.base().bubbles_or_trickles_down() {
            if let Some(leaf) = evt.base().leaf_target().cloned() {
                let path = self.paths.build(&leaf, evt.base());
                evt.base_mut().set_path(path);
            }
        }

        let coordinator_id = coordinator.id();
        let result = match evt.base_mut().take_path() {
            Some(path) => {
                let mut result = Ok(());
                for target in path.target_elements() {
                    if target.coordinator_id() != coordinator_id || evt.base().skips(target.id()) {
                        continue;
                    }
                    evt.base_mut().set_target(Some(Rc::clone(target)));
                    result = execute_default_action(evt);
                    if result.is_err() {
                        break;
                    }
                }
                evt.base_mut().reset_target_to_leaf();
                self.paths.release(path);
                result
            }
            None => {
                if evt.base().target().is_none() {
                    evt.base_mut().set_target(Some(Rc::clone(coordinator.root_handler())));
                }
                let owned = evt
                    .base()
                    .target()
                    .is_some_and(|target| target.coordinator_id() == coordinator_id);
                if owned {
                    execute_default_action(evt)
                } else {
                    Ok(())
                }
            }
        };
        result?;

        coordinator.post_process_event(&*evt);
        evt.base_mut().set_processed();
        Ok(())
    }

    fn apply_dispatching_strategies(&self, evt: &mut dyn AnyEvent, coordinator: &EventCoordinator) -> Result<()> {
        if coordinator.intercept_event(&*evt) {
            tracing::debug!(event_id = evt.base().event_id(), "Event intercepted by observer");
            let base = evt.base_mut();
            base.stop_propagation();
            base.prevent_default();
            base.stop_dispatch();
            return Ok(());
        }

        for strategy in &self.strategies {
            if strategy.can_dispatch_event(&*evt) {
                strategy.dispatch_event(evt, coordinator)?;
                if evt.base().is_dispatch_stopped() || evt.base().is_propagation_stopped() {
                    break;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Gates
    // ========================================================================

    /// Defer queued-mode dispatches until the returned gate is dropped or opened
    pub fn gate(&self) -> DispatcherGate<'_> {
        self.close_gate();
        DispatcherGate {
            dispatcher: self,
            open: false,
        }
    }

    /// Close a gate; pair with [`open_gate`](Self::open_gate)
    pub fn close_gate(&self) {
        self.gate_count.set(self.gate_count.get() + 1);
    }

    /// Open a gate, draining the queue when the last one opens
    pub fn open_gate(&self) -> Result<()> {
        let count = self.gate_count.get();
        debug_assert!(count > 0, "open_gate called without a matching close_gate");
        let count = count.saturating_sub(1);
        self.gate_count.set(count);
        if count == 0 {
            self.process_event_queue()
        } else {
            Ok(())
        }
    }

    fn process_event_queue(&self) -> Result<()> {
        let fresh = self.queue_pool.borrow_mut().get_or(VecDeque::new);
        let mut to_process = self.queue.replace(fresh);
        if to_process.is_empty() {
            self.queue_pool.borrow_mut().release(to_process);
            return Ok(());
        }

        tracing::debug!(count = to_process.len(), "Draining event queue");
        let was_processing = self.processing_events.replace(true);
        let mut result = Ok(());
        while let Some(record) = to_process.pop_front() {
            let outcome = match record.coordinator.upgrade() {
                Some(coordinator) => self.process_event(&record.event, &coordinator),
                None => {
                    tracing::warn!(
                        event_id = record.event.event_id(),
                        "Dropping queued event whose coordinator no longer exists"
                    );
                    Ok(())
                }
            };
            record.event.release();
            if let Err(err) = outcome {
                result = Err(err);
                break;
            }
        }
        self.processing_events.set(was_processing);

        if !to_process.is_empty() {
            // Hand unprocessed records back so the next drain picks them up first
            let mut live = self.queue.borrow_mut();
            while let Some(record) = to_process.pop_back() {
                live.push_front(record);
            }
        }
        self.queue_pool.borrow_mut().release(to_process);
        result
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    /// Drain the queue, then isolate subsequent dispatches in a fresh context
    pub fn push_dispatcher_context(&self) -> Result<()> {
        self.process_event_queue()?;
        let fresh = self.queue_pool.borrow_mut().get_or(VecDeque::new);
        let queue = self.queue.replace(fresh);
        let gate_count = self.gate_count.replace(0);
        self.contexts.borrow_mut().push(DispatchContext { gate_count, queue });
        tracing::debug!(depth = self.context_depth(), "Pushed dispatcher context");
        Ok(())
    }

    /// Restore the enclosing context
    ///
    /// # Panics
    ///
    /// Panics if a gate is still closed, the queue is not empty, or no
    /// context was pushed.
    pub fn pop_dispatcher_context(&self) {
        assert_eq!(
            self.gate_count.get(),
            0,
            "all gates should have been opened before popping dispatch context"
        );
        assert!(
            self.queue.borrow().is_empty(),
            "queue should be empty when popping dispatch context"
        );
        let context = self.contexts.borrow_mut().pop();
        let Some(context) = context else {
            panic!("pop_dispatcher_context called without a pushed context");
        };

        self.gate_count.set(context.gate_count);
        let settled = self.queue.replace(context.queue);
        self.queue_pool.borrow_mut().release(settled);
        tracing::debug!(depth = self.context_depth(), "Popped dispatcher context");
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::create_default()
    }
}

/// Closed gate held by the dispatcher while it processes one event
///
/// Dropping without [`open`](Self::open) only restores the count, so an
/// unwinding callback cannot leave the gate closed.
struct GateGuard<'a> {
    dispatcher: &'a EventDispatcher,
    armed: bool,
}

impl<'a> GateGuard<'a> {
    fn close(dispatcher: &'a EventDispatcher) -> Self {
        dispatcher.close_gate();
        Self {
            dispatcher,
            armed: true,
        }
    }

    fn open(mut self) -> Result<()> {
        self.armed = false;
        self.dispatcher.open_gate()
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let count = self.dispatcher.gate_count.get();
            self.dispatcher.gate_count.set(count.saturating_sub(1));
        }
    }
}

/// A closed dispatcher gate
///
/// Opens on drop, draining the queue if it was the last closed gate. Errors
/// from that drain are logged; call [`open`](Self::open) to receive them.
#[must_use = "the gate opens as soon as it is dropped"]
pub struct DispatcherGate<'a> {
    dispatcher: &'a EventDispatcher,
    open: bool,
}

impl DispatcherGate<'_> {
    /// Open the gate now, returning any error from the drain
    pub fn open(mut self) -> Result<()> {
        self.open = true;
        self.dispatcher.open_gate()
    }
}

impl Drop for DispatcherGate<'_> {
    fn drop(&mut self) {
        if self.open {
            return;
        }
        if std::thread::panicking() {
            let count = self.dispatcher.gate_count.get();
            self.dispatcher.gate_count.set(count.saturating_sub(1));
            return;
        }
        if let Err(err) = self.dispatcher.open_gate() {
            tracing::error!(error = %err, "Dispatch failed while draining on gate drop");
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("strategies", &self.strategies.len())
            .field("gate_count", &self.gate_count.get())
            .field("queued", &self.queued_len())
            .field("contexts", &self.context_depth())
            .field("immediate", &self.immediate)
            .finish()
    }
}
