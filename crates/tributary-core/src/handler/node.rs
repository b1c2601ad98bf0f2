//! Tree nodes that own callbacks and originate sends

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::Location;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::callback::{CallbackIdentity, EventCallback, EventCallbackWithArgs, InvokePolicy, TrickleDown};
use super::listeners::ListenerRecord;
use super::registry::CallbackRegistry;
use crate::coordinator::{CoordinatorId, EventCoordinator, TickPhase};
use crate::dispatch::DispatchMode;
use crate::error::{CallbackResult, DispatchError, Result};
use crate::events::{AnyEvent, EventHandle, EventPayload, EventTypeId, PropagationPhase};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handler identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Behavior a handler runs after callbacks, unless the event was prevented
///
/// The `disabled` variants run instead of the normal ones when the handler is
/// disabled and the event skips disabled handlers.
pub trait DefaultActions {
    /// Runs on each target during the at-target default phase
    fn execute_default_action_at_target(&self, _evt: &mut dyn AnyEvent) -> CallbackResult {
        Ok(())
    }

    /// Runs once on the dispatched target after bubbling
    fn execute_default_action(&self, _evt: &mut dyn AnyEvent) -> CallbackResult {
        Ok(())
    }

    fn execute_default_action_disabled_at_target(&self, _evt: &mut dyn AnyEvent) -> CallbackResult {
        Ok(())
    }

    fn execute_default_action_disabled(&self, _evt: &mut dyn AnyEvent) -> CallbackResult {
        Ok(())
    }
}

/// A node in the event hierarchy
///
/// Handlers are created through [`EventCoordinator::handler`] and always
/// live behind an `Rc`. The parent link is weak: a child never keeps its
/// parent alive. The callback registry is only allocated on first
/// registration.
pub struct CallbackHandler {
    id: HandlerId,
    name: String,
    parent: RefCell<Weak<CallbackHandler>>,
    composite_root: Cell<bool>,
    enabled: Cell<bool>,
    bubbles_on_send: bool,
    tick: TickPhase,
    coordinator: Weak<EventCoordinator>,
    coordinator_id: CoordinatorId,
    registry: RefCell<Option<Rc<CallbackRegistry>>>,
    default_actions: Option<Rc<dyn DefaultActions>>,
}

impl CallbackHandler {
    // ========================================================================
    // Hierarchy
    // ========================================================================

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent handler, if it is still alive
    pub fn parent(&self) -> Option<Rc<CallbackHandler>> {
        self.parent.borrow().upgrade()
    }

    /// Re-parent this handler
    ///
    /// Fails with [`DispatchError::ParentCycle`] if `parent` is this handler
    /// or one of its descendants.
    pub fn set_parent(&self, parent: Option<&Rc<CallbackHandler>>) -> Result<()> {
        if let Some(parent) = parent {
            let mut cursor = Some(Rc::clone(parent));
            while let Some(node) = cursor {
                if node.id == self.id {
                    return Err(DispatchError::ParentCycle {
                        child: self.id,
                        parent: parent.id,
                    });
                }
                cursor = node.parent();
            }
        }
        *self.parent.borrow_mut() = parent.map(Rc::downgrade).unwrap_or_default();
        Ok(())
    }

    /// Topmost ancestor reachable through parent links
    pub fn root(self: &Rc<Self>) -> Rc<CallbackHandler> {
        let mut node = Rc::clone(self);
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    pub fn is_composite_root(&self) -> bool {
        self.composite_root.get()
    }

    pub fn set_composite_root(&self, value: bool) {
        self.composite_root.set(value);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, value: bool) {
        self.enabled.set(value);
    }

    pub fn tick(&self) -> TickPhase {
        self.tick
    }

    /// Whether sends from this handler force the event to bubble
    pub fn bubbles_on_send(&self) -> bool {
        self.bubbles_on_send
    }

    /// Owning coordinator, if it is still alive
    pub fn coordinator(&self) -> Option<Rc<EventCoordinator>> {
        self.coordinator.upgrade()
    }

    pub fn coordinator_id(&self) -> CoordinatorId {
        self.coordinator_id
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// The registry, if anything was ever registered
    pub fn registry(&self) -> Option<Rc<CallbackRegistry>> {
        self.registry.borrow().clone()
    }

    fn registry_or_create(&self) -> Rc<CallbackRegistry> {
        let mut registry = self.registry.borrow_mut();
        Rc::clone(registry.get_or_insert_with(|| Rc::new(CallbackRegistry::new())))
    }

    /// Register `callback` for events carrying `P`
    ///
    /// Returns `false` if the same callback is already registered for the
    /// same phase.
    #[track_caller]
    pub fn register_callback<P: EventPayload>(&self, callback: &EventCallback<P>, trickle: TrickleDown) -> bool {
        self.register_callback_with_policy(callback, trickle, InvokePolicy::Default)
    }

    /// Register `callback` with an explicit disabled-handler policy
    #[track_caller]
    pub fn register_callback_with_policy<P: EventPayload>(
        &self,
        callback: &EventCallback<P>,
        trickle: TrickleDown,
        policy: InvokePolicy,
    ) -> bool {
        let added = self.registry_or_create().register(callback, trickle, policy);
        if added {
            self.track_listener(EventTypeId::of::<P>(), callback.identity(), trickle, Location::caller());
        }
        added
    }

    /// Register `callback` bound to `args`, replacing the argument of an existing registration
    #[track_caller]
    pub fn register_callback_with_args<P: EventPayload, A: 'static>(
        &self,
        callback: &EventCallbackWithArgs<P, A>,
        args: A,
        trickle: TrickleDown,
    ) -> bool {
        let added = self
            .registry_or_create()
            .register_with_args(callback, args, trickle, InvokePolicy::Default);
        if added {
            self.track_listener(EventTypeId::of::<P>(), callback.identity(), trickle, Location::caller());
        }
        added
    }

    /// Remove a registration; returns whether anything was removed
    pub fn unregister_callback<P: EventPayload>(&self, callback: &EventCallback<P>, trickle: TrickleDown) -> bool {
        let removed = self
            .registry()
            .is_some_and(|registry| registry.unregister(callback, trickle));
        if removed {
            self.untrack_listener(EventTypeId::of::<P>(), callback.identity(), trickle);
        }
        removed
    }

    pub fn unregister_callback_with_args<P: EventPayload, A: 'static>(
        &self,
        callback: &EventCallbackWithArgs<P, A>,
        trickle: TrickleDown,
    ) -> bool {
        let removed = self
            .registry()
            .is_some_and(|registry| registry.unregister_with_args(callback, trickle));
        if removed {
            self.untrack_listener(EventTypeId::of::<P>(), callback.identity(), trickle);
        }
        removed
    }

    /// Argument bound to a registration made with arguments
    pub fn try_get_user_args<P: EventPayload, A: Clone + 'static>(
        &self,
        callback: &EventCallbackWithArgs<P, A>,
        trickle: TrickleDown,
    ) -> Option<A> {
        self.registry()?.try_get_user_args(callback, trickle)
    }

    pub fn has_trickle_down_handlers(&self) -> bool {
        self.registry
            .borrow()
            .as_ref()
            .is_some_and(|registry| registry.has_trickle_down_handlers())
    }

    pub fn has_bubble_up_handlers(&self) -> bool {
        self.registry
            .borrow()
            .as_ref()
            .is_some_and(|registry| registry.has_bubble_up_handlers())
    }

    fn track_listener(
        &self,
        event_type: EventTypeId,
        callback: CallbackIdentity,
        trickle: TrickleDown,
        location: &'static Location<'static>,
    ) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.record_listener(
                self.id,
                event_type,
                ListenerRecord::new(callback, event_type, trickle, location),
            );
        }
    }

    fn untrack_listener(&self, event_type: EventTypeId, callback: CallbackIdentity, trickle: TrickleDown) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.forget_listener(self.id, event_type, callback, trickle);
        }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Target `evt` at this handler and dispatch it in queued mode
    pub fn send_event(self: &Rc<Self>, evt: &EventHandle) -> Result<()> {
        self.send_event_with_mode(evt, DispatchMode::Queued)
    }

    /// Target `evt` at this handler and dispatch it through the owning coordinator
    ///
    /// # Panics
    ///
    /// Panics if `evt` is the event currently being dispatched.
    pub fn send_event_with_mode(self: &Rc<Self>, evt: &EventHandle, mode: DispatchMode) -> Result<()> {
        let coordinator = self
            .coordinator
            .upgrade()
            .ok_or(DispatchError::CoordinatorDropped { handler: self.id })?;
        {
            let Ok(mut event) = evt.try_borrow_mut() else {
                panic!("event is already being dispatched; send a fresh instance");
            };
            let base = event.base_mut();
            base.set_target(Some(Rc::clone(self)));
            if self.bubbles_on_send {
                base.set_bubbles(true);
            }
        }
        coordinator.dispatch(evt, mode, self.tick)
    }

    // ========================================================================
    // Local dispatch
    // ========================================================================

    /// Fast path for events that neither bubble nor trickle down
    pub(crate) fn handle_event_at_target_phase(&self, evt: &mut dyn AnyEvent) -> CallbackResult {
        let target = evt.base().target().cloned();
        evt.base_mut().set_current_target(target);
        evt.base_mut().set_phase(PropagationPhase::AtTarget);
        self.handle_event_at_current_target_and_phase(evt)?;
        evt.base_mut().set_phase(PropagationPhase::DefaultActionAtTarget);
        self.handle_event_at_current_target_and_phase(evt)
    }

    /// Run whatever this handler does for the event's current phase
    pub(crate) fn handle_event_at_current_target_and_phase(&self, evt: &mut dyn AnyEvent) -> CallbackResult {
        match evt.base().phase() {
            phase @ (PropagationPhase::TrickleDown | PropagationPhase::BubbleUp) => {
                if !evt.base().is_propagation_stopped() {
                    self.invoke_callbacks(evt, phase)?;
                }
            }
            PropagationPhase::AtTarget => {
                // Target work runs even after propagation was stopped upstream
                self.invoke_callbacks(evt, PropagationPhase::TrickleDown)?;
                self.invoke_callbacks(evt, PropagationPhase::BubbleUp)?;
            }
            PropagationPhase::DefaultActionAtTarget => self.run_default_action(evt, true)?,
            PropagationPhase::DefaultAction => self.run_default_action(evt, false)?,
            PropagationPhase::None => {}
        }
        Ok(())
    }

    fn routes_to_disabled(&self, evt: &dyn AnyEvent) -> bool {
        evt.base().skip_disabled() && !self.is_enabled()
    }

    fn invoke_callbacks(&self, evt: &mut dyn AnyEvent, phase: PropagationPhase) -> CallbackResult {
        let Some(registry) = self.registry() else {
            return Ok(());
        };
        let include_disabled_only = self.routes_to_disabled(evt);
        registry.invoke_callbacks(evt, phase, include_disabled_only)
    }

    fn run_default_action(&self, evt: &mut dyn AnyEvent, at_target: bool) -> CallbackResult {
        if evt.base().is_default_prevented() {
            return Ok(());
        }
        let Some(actions) = self.default_actions.as_ref() else {
            return Ok(());
        };
        tracing::trace!(
            event_id = evt.base().event_id(),
            handler = %self.name,
            at_target,
            "Running default action"
        );
        match (at_target, self.routes_to_disabled(evt)) {
            (true, false) => actions.execute_default_action_at_target(evt),
            (true, true) => actions.execute_default_action_disabled_at_target(evt),
            (false, false) => actions.execute_default_action(evt),
            (false, true) => actions.execute_default_action_disabled(evt),
        }
    }
}

impl Drop for CallbackHandler {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.forget_handler(self.id);
        }
    }
}

impl fmt::Debug for CallbackHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandler")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent().map(|p| p.id))
            .field("composite_root", &self.composite_root.get())
            .field("enabled", &self.enabled.get())
            .field("coordinator", &self.coordinator_id)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Configures a new handler; obtained from [`EventCoordinator::handler`]
#[must_use]
pub struct HandlerBuilder {
    coordinator: Weak<EventCoordinator>,
    coordinator_id: CoordinatorId,
    name: String,
    parent: Option<Rc<CallbackHandler>>,
    composite_root: bool,
    enabled: bool,
    bubbles_on_send: bool,
    tick: TickPhase,
    default_actions: Option<Rc<dyn DefaultActions>>,
}

impl HandlerBuilder {
    pub(crate) fn new(
        coordinator: Weak<EventCoordinator>,
        coordinator_id: CoordinatorId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            coordinator_id,
            name: name.into(),
            parent: None,
            composite_root: false,
            enabled: true,
            bubbles_on_send: true,
            tick: TickPhase::Update,
            default_actions: None,
        }
    }

    pub fn parent(mut self, parent: &Rc<CallbackHandler>) -> Self {
        self.parent = Some(Rc::clone(parent));
        self
    }

    pub fn composite_root(mut self, value: bool) -> Self {
        self.composite_root = value;
        self
    }

    pub fn enabled(mut self, value: bool) -> Self {
        self.enabled = value;
        self
    }

    /// Whether sends from the handler force bubbling (default `true`)
    pub fn bubbles_on_send(mut self, value: bool) -> Self {
        self.bubbles_on_send = value;
        self
    }

    /// Tick whose queue receives this handler's sends (default [`TickPhase::Update`])
    pub fn tick(mut self, tick: TickPhase) -> Self {
        self.tick = tick;
        self
    }

    pub fn default_actions(mut self, actions: Rc<dyn DefaultActions>) -> Self {
        self.default_actions = Some(actions);
        self
    }

    pub fn build(self) -> Rc<CallbackHandler> {
        let handler = Rc::new(CallbackHandler {
            id: HandlerId::next(),
            name: self.name,
            parent: RefCell::new(self.parent.as_ref().map(Rc::downgrade).unwrap_or_default()),
            composite_root: Cell::new(self.composite_root),
            enabled: Cell::new(self.enabled),
            bubbles_on_send: self.bubbles_on_send,
            tick: self.tick,
            coordinator: self.coordinator,
            coordinator_id: self.coordinator_id,
            registry: RefCell::new(None),
            default_actions: self.default_actions,
        });
        tracing::trace!(handler = %handler.name, id = %handler.id, "Created handler");
        handler
    }
}
