//! Per-handler callback storage that stays consistent while being iterated
//!
//! # Mutation during invocation
//!
//! [`CallbackRegistry::invoke_callbacks`] iterates a snapshot of the live list
//! and bumps an invocation depth counter for the duration. Any register or
//! unregister observed while the depth is non-zero is applied to a temporary
//! copy instead of the live list. When the depth returns to zero the copy
//! replaces the live list, so the current pass never sees the change and the
//! next dispatch always does.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::callback::{
    CallbackEntry, CallbackIdentity, CallbackPhase, EventCallback, EventCallbackWithArgs,
    InvokePolicy, TrickleDown,
};
use crate::error::CallbackResult;
use crate::events::{AnyEvent, EventPayload, EventTypeId, PropagationPhase};

/// Ordered callback entries with per-phase counts
#[derive(Debug, Clone, Default)]
pub(crate) struct CallbackList {
    entries: Vec<CallbackEntry>,
    trickle_down_count: usize,
    bubble_up_count: usize,
}

impl CallbackList {
    fn find(
        &self,
        event_type: EventTypeId,
        identity: CallbackIdentity,
        phase: CallbackPhase,
    ) -> Option<&CallbackEntry> {
        self.entries
            .iter()
            .find(|entry| entry.is_equivalent_to(event_type, identity, phase))
    }

    fn contains(&self, event_type: EventTypeId, identity: CallbackIdentity, phase: CallbackPhase) -> bool {
        self.find(event_type, identity, phase).is_some()
    }

    fn add(&mut self, entry: CallbackEntry) {
        match entry.phase {
            CallbackPhase::TrickleDownAndTarget => self.trickle_down_count += 1,
            CallbackPhase::TargetAndBubbleUp => self.bubble_up_count += 1,
        }
        self.entries.push(entry);
    }

    fn remove(&mut self, event_type: EventTypeId, identity: CallbackIdentity, phase: CallbackPhase) -> bool {
        let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.is_equivalent_to(event_type, identity, phase))
        else {
            return false;
        };
        let entry = self.entries.remove(index);
        match entry.phase {
            CallbackPhase::TrickleDownAndTarget => self.trickle_down_count -= 1,
            CallbackPhase::TargetAndBubbleUp => self.bubble_up_count -= 1,
        }
        true
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Phase-tagged callbacks registered on one handler
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    callbacks: RefCell<Option<Rc<CallbackList>>>,
    temporary: RefCell<Option<CallbackList>>,
    invoking: Cell<u32>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_list_for_writing<R>(&self, f: impl FnOnce(&mut CallbackList) -> R) -> R {
        if self.invoking.get() > 0 {
            let mut temporary = self.temporary.borrow_mut();
            let list = temporary.get_or_insert_with(|| {
                tracing::trace!("Registry mutated during invocation, writing to temporary list");
                self.callbacks
                    .borrow()
                    .as_deref()
                    .cloned()
                    .unwrap_or_default()
            });
            f(list)
        } else {
            let mut callbacks = self.callbacks.borrow_mut();
            let list = callbacks.get_or_insert_with(|| Rc::new(CallbackList::default()));
            f(Rc::make_mut(list))
        }
    }

    fn with_list_for_reading<R>(&self, f: impl FnOnce(Option<&CallbackList>) -> R) -> R {
        let temporary = self.temporary.borrow();
        if let Some(list) = temporary.as_ref() {
            return f(Some(list));
        }
        let callbacks = self.callbacks.borrow();
        f(callbacks.as_deref())
    }

    /// Register a callback; returns `false` if an equivalent entry exists
    pub fn register<P: EventPayload>(
        &self,
        callback: &EventCallback<P>,
        trickle: TrickleDown,
        policy: InvokePolicy,
    ) -> bool {
        let event_type = EventTypeId::of::<P>();
        let phase = CallbackPhase::from(trickle);
        let identity = callback.identity();

        let exists =
            self.with_list_for_reading(|list| list.is_some_and(|l| l.contains(event_type, identity, phase)));
        if exists {
            return false;
        }
        self.with_list_for_writing(|list| list.add(CallbackEntry::typed(callback, phase, policy)));
        true
    }

    /// Register a callback bound to `args`
    ///
    /// If an equivalent entry exists its argument is replaced in place and
    /// `false` is returned.
    pub fn register_with_args<P: EventPayload, A: 'static>(
        &self,
        callback: &EventCallbackWithArgs<P, A>,
        args: A,
        trickle: TrickleDown,
        policy: InvokePolicy,
    ) -> bool {
        let event_type = EventTypeId::of::<P>();
        let phase = CallbackPhase::from(trickle);
        let identity = callback.identity();

        let mut args = Some(args);
        let updated = self.with_list_for_reading(|list| {
            let Some(functor) = list
                .and_then(|l| l.find(event_type, identity, phase))
                .and_then(|entry| entry.args_functor::<P, A>())
            else {
                return false;
            };
            if let Some(args) = args.take() {
                functor.set_args(args);
            }
            true
        });
        if updated {
            return false;
        }

        if let Some(args) = args {
            self.with_list_for_writing(|list| {
                list.add(CallbackEntry::with_args(callback, args, phase, policy))
            });
        }
        true
    }

    /// Remove a registration; returns whether anything was removed
    pub fn unregister<P: EventPayload>(&self, callback: &EventCallback<P>, trickle: TrickleDown) -> bool {
        self.unregister_identity(EventTypeId::of::<P>(), callback.identity(), trickle)
    }

    /// Remove a registration made with arguments
    pub fn unregister_with_args<P: EventPayload, A: 'static>(
        &self,
        callback: &EventCallbackWithArgs<P, A>,
        trickle: TrickleDown,
    ) -> bool {
        self.unregister_identity(EventTypeId::of::<P>(), callback.identity(), trickle)
    }

    fn unregister_identity(
        &self,
        event_type: EventTypeId,
        identity: CallbackIdentity,
        trickle: TrickleDown,
    ) -> bool {
        let phase = CallbackPhase::from(trickle);
        self.with_list_for_writing(|list| list.remove(event_type, identity, phase))
    }

    /// Argument bound to a registration, if it exists
    pub fn try_get_user_args<P: EventPayload, A: Clone + 'static>(
        &self,
        callback: &EventCallbackWithArgs<P, A>,
        trickle: TrickleDown,
    ) -> Option<A> {
        let event_type = EventTypeId::of::<P>();
        let phase = CallbackPhase::from(trickle);
        let identity = callback.identity();
        self.with_list_for_reading(|list| {
            list.and_then(|l| l.find(event_type, identity, phase))
                .and_then(|entry| entry.args_functor::<P, A>())
                .map(|functor| A::clone(&functor.args()))
        })
    }

    /// Invoke every entry matching the event's type and `phase`
    ///
    /// Stops at the first entry after immediate propagation was stopped. When
    /// `include_disabled_only` is set, only entries registered with
    /// [`InvokePolicy::IncludeDisabled`] run. The first callback error aborts
    /// the pass and is returned.
    pub fn invoke_callbacks(
        &self,
        evt: &mut dyn AnyEvent,
        phase: PropagationPhase,
        include_disabled_only: bool,
    ) -> CallbackResult {
        let list = match self.callbacks.borrow().as_ref() {
            Some(list) => Rc::clone(list),
            None => return Ok(()),
        };

        let _guard = InvocationGuard::enter(self);
        for entry in &list.entries {
            if evt.base().is_immediate_propagation_stopped() {
                break;
            }
            if include_disabled_only && entry.policy != InvokePolicy::IncludeDisabled {
                continue;
            }
            entry.invoke(evt, phase)?;
        }
        Ok(())
    }

    /// Whether any live entry listens to the trickle-down phase
    pub fn has_trickle_down_handlers(&self) -> bool {
        self.callbacks
            .borrow()
            .as_ref()
            .is_some_and(|list| list.trickle_down_count > 0)
    }

    /// Whether any live entry listens to the bubble-up phase
    pub fn has_bubble_up_handlers(&self) -> bool {
        self.callbacks
            .borrow()
            .as_ref()
            .is_some_and(|list| list.bubble_up_count > 0)
    }

    /// Number of entries, including changes pending behind an invocation
    pub fn len(&self) -> usize {
        self.with_list_for_reading(|list| list.map_or(0, CallbackList::len))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current invocation depth
    pub fn invocation_depth(&self) -> u32 {
        self.invoking.get()
    }

    /// Whether a temporary list is holding changes made during invocation
    pub fn has_pending_changes(&self) -> bool {
        self.temporary.borrow().is_some()
    }
}

/// Tracks invocation depth and publishes pending changes on the way out
///
/// Dropping runs on every exit path, including callback errors and panics.
struct InvocationGuard<'a> {
    registry: &'a CallbackRegistry,
}

impl<'a> InvocationGuard<'a> {
    fn enter(registry: &'a CallbackRegistry) -> Self {
        registry.invoking.set(registry.invoking.get() + 1);
        Self { registry }
    }
}

impl Drop for InvocationGuard<'_> {
    fn drop(&mut self) {
        let depth = self.registry.invoking.get().saturating_sub(1);
        self.registry.invoking.set(depth);
        if depth == 0 {
            if let Some(list) = self.registry.temporary.borrow_mut().take() {
                *self.registry.callbacks.borrow_mut() = Some(Rc::new(list));
            }
        }
    }
}
