//! Event coordinator: owns the dispatcher, the event pool and the root of the tree
//!
//! A coordinator is the unit an application drives. Handlers are built from
//! it, sends from those handlers are routed through its dispatcher, and
//! events aimed at a tick other than the current one wait in a per-tick
//! queue until [`EventCoordinator::tick`] runs for that phase.
//!
//! ```text
//!                root (composite root)
//!        ┌──────────────┼──────────────┐
//!     update      fixed_update     late_update
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tributary_config::EventsConfig;

use crate::dispatch::{DefaultDispatchingStrategy, DispatchMode, DispatchingStrategy, EventDispatcher};
use crate::error::Result;
use crate::events::{AnyEvent, EventHandle, EventPayload, EventPool, EventTypeId};
use crate::handler::{CallbackHandler, CallbackIdentity, HandlerBuilder, HandlerId, ListenerRecord, ListenerTable, TrickleDown};

static NEXT_COORDINATOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique coordinator identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoordinatorId(u64);

impl CoordinatorId {
    fn next() -> Self {
        Self(NEXT_COORDINATOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CoordinatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "coordinator#{}", self.0)
    }
}

/// Frame phase a handler's sends are delivered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPhase {
    #[default]
    Update,
    FixedUpdate,
    LateUpdate,
}

impl TickPhase {
    pub const ALL: [TickPhase; 3] = [TickPhase::Update, TickPhase::FixedUpdate, TickPhase::LateUpdate];

    fn index(self) -> usize {
        match self {
            TickPhase::Update => 0,
            TickPhase::FixedUpdate => 1,
            TickPhase::LateUpdate => 2,
        }
    }

    fn handler_name(self) -> &'static str {
        match self {
            TickPhase::Update => "update",
            TickPhase::FixedUpdate => "fixed_update",
            TickPhase::LateUpdate => "late_update",
        }
    }
}

/// Hooks for tools that watch or filter dispatch
///
/// Every attached observer is consulted for every processed event. An
/// observer that returns `true` from [`intercept_event`](Self::intercept_event)
/// keeps the event from reaching any handler.
pub trait DispatchObserver {
    /// Return `true` to swallow the event before any strategy runs
    fn intercept_event(&self, _evt: &dyn AnyEvent) -> bool {
        false
    }

    /// Called after default actions, before the event is marked processed
    fn post_process_event(&self, _evt: &dyn AnyEvent) {}

    /// Called after each coordinator dispatch or tick
    fn refresh(&self) {}

    /// Called when the observer is detached
    fn disconnect(&self) {}
}

/// Owner of a handler tree, its dispatcher and its event pool
pub struct EventCoordinator {
    id: CoordinatorId,
    dispatcher: EventDispatcher,
    events: Rc<EventPool>,
    root: Rc<CallbackHandler>,
    tick_handlers: [Rc<CallbackHandler>; 3],
    current_tick: Cell<TickPhase>,
    tick_queues: [RefCell<VecDeque<EventHandle>>; 3],
    observers: RefCell<Vec<Rc<dyn DispatchObserver>>>,
    listeners: RefCell<ListenerTable>,
    tracking: Cell<bool>,
}

impl EventCoordinator {
    /// Coordinator with default configuration and the standard strategy
    pub fn new() -> Rc<Self> {
        Self::with_config(&EventsConfig::default())
    }

    pub fn with_config(config: &EventsConfig) -> Rc<Self> {
        Self::with_strategies(config, vec![Box::new(DefaultDispatchingStrategy)])
    }

    /// Coordinator consulting `strategies` in order
    pub fn with_strategies(config: &EventsConfig, strategies: Vec<Box<dyn DispatchingStrategy>>) -> Rc<Self> {
        let id = CoordinatorId::next();
        let coordinator = Rc::new_cyclic(|weak| {
            let root = HandlerBuilder::new(weak.clone(), id, "root")
                .composite_root(true)
                .bubbles_on_send(false)
                .build();
            let tick_handlers = TickPhase::ALL.map(|phase| {
                HandlerBuilder::new(weak.clone(), id, phase.handler_name())
                    .parent(&root)
                    .tick(phase)
                    .build()
            });

            Self {
                id,
                dispatcher: EventDispatcher::with_config(strategies, &config.dispatcher),
                events: EventPool::new(config.pool.max_pooled_per_type),
                root,
                tick_handlers,
                current_tick: Cell::new(TickPhase::default()),
                tick_queues: Default::default(),
                observers: RefCell::new(Vec::new()),
                listeners: RefCell::new(ListenerTable::new()),
                tracking: Cell::new(config.tracking.listeners),
            }
        });
        tracing::debug!(
            coordinator = %id,
            immediate = config.dispatcher.immediate,
            tracking = config.tracking.listeners,
            "Created event coordinator"
        );
        coordinator
    }

    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn events(&self) -> &Rc<EventPool> {
        &self.events
    }

    /// Composite root every default handler hangs under
    pub fn root_handler(&self) -> &Rc<CallbackHandler> {
        &self.root
    }

    /// Handler that groups the given tick's handlers
    pub fn tick_handler(&self, phase: TickPhase) -> &Rc<CallbackHandler> {
        &self.tick_handlers[phase.index()]
    }

    /// Start building a handler owned by this coordinator
    pub fn handler(self: &Rc<Self>, name: impl Into<String>) -> HandlerBuilder {
        HandlerBuilder::new(Rc::downgrade(self), self.id, name)
    }

    /// Check out a pooled event carrying `payload`
    pub fn pooled<P: EventPayload>(&self, payload: P) -> EventHandle {
        self.events.get(payload)
    }

    pub fn current_tick(&self) -> TickPhase {
        self.current_tick.get()
    }

    /// Events waiting for `phase`
    pub fn pending_for_tick(&self, phase: TickPhase) -> usize {
        self.tick_queues[phase.index()].borrow().len()
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Dispatch `evt` now, or hold it until `tick` runs
    ///
    /// Immediate dispatches and dispatches for the current tick go straight
    /// to the dispatcher. Anything else is acquired and queued for its tick.
    pub fn dispatch(self: &Rc<Self>, evt: &EventHandle, mode: DispatchMode, tick: TickPhase) -> Result<()> {
        if mode == DispatchMode::Immediate || tick == self.current_tick.get() {
            let result = self.dispatcher.dispatch(evt, self, mode);
            self.refresh();
            return result;
        }

        evt.acquire();
        self.tick_queues[tick.index()].borrow_mut().push_back(evt.clone());
        tracing::trace!(event_id = evt.event_id(), tick = ?tick, "Event deferred to tick");
        Ok(())
    }

    /// Run `phase`: drain its queue, then settle everything those events caused
    pub fn tick(self: &Rc<Self>, phase: TickPhase) -> Result<()> {
        self.current_tick.set(phase);
        let mut pending = std::mem::take(&mut *self.tick_queues[phase.index()].borrow_mut());
        if !pending.is_empty() {
            tracing::debug!(tick = ?phase, count = pending.len(), "Draining tick queue");
        }

        let mut result = Ok(());
        while let Some(evt) = pending.pop_front() {
            let outcome = self.dispatcher.dispatch(&evt, self, DispatchMode::Queued);
            evt.release();
            if let Err(err) = outcome {
                result = Err(err);
                break;
            }
        }
        if !pending.is_empty() {
            let mut queue = self.tick_queues[phase.index()].borrow_mut();
            while let Some(evt) = pending.pop_back() {
                queue.push_front(evt);
            }
        }

        self.refresh();
        result?;
        self.dispatcher.push_dispatcher_context()?;
        self.dispatcher.pop_dispatcher_context();
        Ok(())
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Attach `observer`; returns `false` if it is already attached
    pub fn attach_observer(&self, observer: Rc<dyn DispatchObserver>) -> bool {
        let mut observers = self.observers.borrow_mut();
        if observers.iter().any(|o| Rc::ptr_eq(o, &observer)) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Detach and disconnect `observer`; returns whether it was attached
    pub fn detach_observer(&self, observer: &Rc<dyn DispatchObserver>) -> bool {
        let removed = {
            let mut observers = self.observers.borrow_mut();
            let before = observers.len();
            observers.retain(|o| !Rc::ptr_eq(o, observer));
            observers.len() != before
        };
        if removed {
            observer.disconnect();
        }
        removed
    }

    pub fn detach_all_observers(&self) {
        let detached = std::mem::take(&mut *self.observers.borrow_mut());
        for observer in detached {
            observer.disconnect();
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Notify observers that dispatch state changed
    pub fn refresh(&self) {
        for observer in self.observer_snapshot() {
            observer.refresh();
        }
    }

    /// Ask every observer; `true` if any of them intercepts
    pub fn intercept_event(&self, evt: &dyn AnyEvent) -> bool {
        self.observer_snapshot()
            .iter()
            .fold(false, |intercepted, observer| observer.intercept_event(evt) || intercepted)
    }

    pub fn post_process_event(&self, evt: &dyn AnyEvent) {
        for observer in self.observer_snapshot() {
            observer.post_process_event(evt);
        }
    }

    // Observers may attach or detach while being notified
    fn observer_snapshot(&self) -> Vec<Rc<dyn DispatchObserver>> {
        self.observers.borrow().clone()
    }

    // ========================================================================
    // Listener tracking
    // ========================================================================

    pub fn listener_tracking(&self) -> bool {
        self.tracking.get()
    }

    /// Turn registration tracking on or off; turning it off forgets all records
    pub fn set_listener_tracking(&self, enabled: bool) {
        self.tracking.set(enabled);
        if !enabled {
            self.listeners.borrow_mut().clear();
        }
    }

    /// Snapshot of the registrations recorded while tracking was on
    ///
    /// The snapshot does not follow later registrations or removals.
    pub fn listeners(&self) -> ListenerTable {
        self.listeners.borrow().clone()
    }

    pub(crate) fn record_listener(&self, handler: HandlerId, event_type: EventTypeId, record: ListenerRecord) {
        if self.tracking.get() {
            self.listeners.borrow_mut().record(handler, event_type, record);
        }
    }

    pub(crate) fn forget_listener(
        &self,
        handler: HandlerId,
        event_type: EventTypeId,
        callback: CallbackIdentity,
        trickle: TrickleDown,
    ) {
        self.listeners
            .borrow_mut()
            .remove(handler, event_type, callback, trickle);
    }

    pub(crate) fn forget_handler(&self, handler: HandlerId) {
        self.listeners.borrow_mut().remove_handler(handler);
    }
}

impl Drop for EventCoordinator {
    fn drop(&mut self) {
        self.detach_all_observers();
        for queue in &self.tick_queues {
            for evt in queue.borrow_mut().drain(..) {
                evt.release();
            }
        }
        tracing::debug!(coordinator = %self.id, "Dropped event coordinator");
    }
}

impl fmt::Debug for EventCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCoordinator")
            .field("id", &self.id)
            .field("current_tick", &self.current_tick.get())
            .field("observers", &self.observer_count())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
