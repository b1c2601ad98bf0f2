//! Callback bindings and the phase tags they are registered with

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::CallbackResult;
use crate::events::{AnyEvent, Event, EventPayload, EventTypeId, PropagationPhase};

/// Which half of the propagation a callback listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrickleDown {
    /// Target and bubble-up phases
    #[default]
    NoTrickleDown,
    /// Trickle-down and target phases
    TrickleDown,
}

/// Phases a registered entry responds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum CallbackPhase {
    TargetAndBubbleUp,
    TrickleDownAndTarget,
}

impl From<TrickleDown> for CallbackPhase {
    fn from(trickle: TrickleDown) -> Self {
        match trickle {
            TrickleDown::NoTrickleDown => CallbackPhase::TargetAndBubbleUp,
            TrickleDown::TrickleDown => CallbackPhase::TrickleDownAndTarget,
        }
    }
}

impl CallbackPhase {
    /// Whether an entry with this tag runs when its registry is invoked for `phase`
    pub(crate) fn matches(self, phase: PropagationPhase) -> bool {
        match self {
            CallbackPhase::TrickleDownAndTarget => matches!(
                phase,
                PropagationPhase::TrickleDown | PropagationPhase::AtTarget
            ),
            CallbackPhase::TargetAndBubbleUp => matches!(
                phase,
                PropagationPhase::AtTarget | PropagationPhase::BubbleUp
            ),
        }
    }
}

/// Whether a callback runs on a disabled handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InvokePolicy {
    /// Skipped when the handler is disabled and the event skips disabled handlers
    #[default]
    Default,
    /// Always runs
    IncludeDisabled,
}

/// Identity of a callback closure, used to match registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CallbackIdentity(usize);

fn identity_of<T: ?Sized>(func: &Rc<T>) -> CallbackIdentity {
    CallbackIdentity(Rc::as_ptr(func) as *const () as usize)
}

/// A callback for events carrying payload `P`
///
/// Clones share identity: registering a clone is a duplicate, and any clone
/// can be used to unregister.
pub struct EventCallback<P> {
    func: Rc<dyn Fn(&mut Event<P>) -> CallbackResult>,
}

impl<P: EventPayload> EventCallback<P> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut Event<P>) -> CallbackResult + 'static,
    {
        Self {
            func: Rc::new(func),
        }
    }

    pub fn identity(&self) -> CallbackIdentity {
        identity_of(&self.func)
    }
}

impl<P> Clone for EventCallback<P> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<P> fmt::Debug for EventCallback<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventCallback")
            .field(&identity_of(&self.func))
            .finish()
    }
}

/// A callback receiving a user argument bound at registration
pub struct EventCallbackWithArgs<P, A> {
    func: Rc<dyn Fn(&mut Event<P>, &A) -> CallbackResult>,
}

impl<P: EventPayload, A: 'static> EventCallbackWithArgs<P, A> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut Event<P>, &A) -> CallbackResult + 'static,
    {
        Self {
            func: Rc::new(func),
        }
    }

    pub fn identity(&self) -> CallbackIdentity {
        identity_of(&self.func)
    }
}

impl<P, A> Clone for EventCallbackWithArgs<P, A> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<P, A> fmt::Debug for EventCallbackWithArgs<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventCallbackWithArgs")
            .field(&identity_of(&self.func))
            .finish()
    }
}

// ============================================================================
// Type-erased entries
// ============================================================================

pub(crate) trait CallbackFunctor {
    fn invoke(&self, evt: &mut dyn AnyEvent) -> CallbackResult;
    fn identity(&self) -> CallbackIdentity;
    fn as_any(&self) -> &dyn Any;
}

struct TypedFunctor<P> {
    callback: EventCallback<P>,
}

impl<P: EventPayload> CallbackFunctor for TypedFunctor<P> {
    fn invoke(&self, evt: &mut dyn AnyEvent) -> CallbackResult {
        match evt.downcast_mut::<P>() {
            Some(typed) => (self.callback.func)(typed),
            None => Ok(()),
        }
    }

    fn identity(&self) -> CallbackIdentity {
        self.callback.identity()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct ArgsFunctor<P, A> {
    callback: EventCallbackWithArgs<P, A>,
    args: RefCell<Rc<A>>,
}

impl<P, A> ArgsFunctor<P, A> {
    pub(crate) fn set_args(&self, args: A) {
        *self.args.borrow_mut() = Rc::new(args);
    }

    pub(crate) fn args(&self) -> Rc<A> {
        Rc::clone(&self.args.borrow())
    }
}

impl<P: EventPayload, A: 'static> CallbackFunctor for ArgsFunctor<P, A> {
    fn invoke(&self, evt: &mut dyn AnyEvent) -> CallbackResult {
        let args = self.args();
        match evt.downcast_mut::<P>() {
            Some(typed) => (self.callback.func)(typed, &args),
            None => Ok(()),
        }
    }

    fn identity(&self) -> CallbackIdentity {
        self.callback.identity()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One registration in a [`CallbackRegistry`](super::CallbackRegistry)
#[derive(Clone)]
pub(crate) struct CallbackEntry {
    pub(crate) event_type: EventTypeId,
    pub(crate) phase: CallbackPhase,
    pub(crate) policy: InvokePolicy,
    pub(crate) functor: Rc<dyn CallbackFunctor>,
}

impl CallbackEntry {
    pub(crate) fn typed<P: EventPayload>(
        callback: &EventCallback<P>,
        phase: CallbackPhase,
        policy: InvokePolicy,
    ) -> Self {
        Self {
            event_type: EventTypeId::of::<P>(),
            phase,
            policy,
            functor: Rc::new(TypedFunctor {
                callback: callback.clone(),
            }),
        }
    }

    pub(crate) fn with_args<P: EventPayload, A: 'static>(
        callback: &EventCallbackWithArgs<P, A>,
        args: A,
        phase: CallbackPhase,
        policy: InvokePolicy,
    ) -> Self {
        Self {
            event_type: EventTypeId::of::<P>(),
            phase,
            policy,
            functor: Rc::new(ArgsFunctor {
                callback: callback.clone(),
                args: RefCell::new(Rc::new(args)),
            }),
        }
    }

    pub(crate) fn is_equivalent_to(
        &self,
        event_type: EventTypeId,
        identity: CallbackIdentity,
        phase: CallbackPhase,
    ) -> bool {
        self.event_type == event_type && self.phase == phase && self.functor.identity() == identity
    }

    pub(crate) fn args_functor<P: EventPayload, A: 'static>(&self) -> Option<&ArgsFunctor<P, A>> {
        self.functor.as_any().downcast_ref::<ArgsFunctor<P, A>>()
    }

    /// Run the callback if it listens to this event type and phase
    pub(crate) fn invoke(&self, evt: &mut dyn AnyEvent, phase: PropagationPhase) -> CallbackResult {
        if evt.event_type() != self.event_type || !self.phase.matches(phase) {
            return Ok(());
        }
        tracing::trace!(
            event_id = evt.base().event_id(),
            event_type = %self.event_type,
            phase = ?phase,
            "Invoking callback"
        );
        self.functor.invoke(evt)
    }
}

impl fmt::Debug for CallbackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackEntry")
            .field("event_type", &self.event_type)
            .field("phase", &self.phase)
            .field("policy", &self.policy)
            .field("identity", &self.functor.identity())
            .finish()
    }
}
