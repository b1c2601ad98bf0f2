//! Pluggable dispatching strategies

use super::propagate::propagate_event;
use crate::coordinator::EventCoordinator;
use crate::error::Result;
use crate::events::AnyEvent;

/// One way of delivering an event
///
/// The dispatcher consults strategies in order. Each applicable strategy
/// dispatches; iteration stops once a strategy stops propagation or calls
/// [`EventBase::stop_dispatch`](crate::events::EventBase::stop_dispatch).
pub trait DispatchingStrategy {
    /// Whether this strategy handles `evt`
    fn can_dispatch_event(&self, evt: &dyn AnyEvent) -> bool;

    /// Deliver `evt` through `coordinator`
    fn dispatch_event(&self, evt: &mut dyn AnyEvent, coordinator: &EventCoordinator) -> Result<()>;
}

/// Standard trickle-down / target / bubble-up propagation
///
/// Only propagates events whose target belongs to the dispatching
/// coordinator, and always ends strategy iteration.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDispatchingStrategy;

impl DispatchingStrategy for DefaultDispatchingStrategy {
    fn can_dispatch_event(&self, _evt: &dyn AnyEvent) -> bool {
        true
    }

    fn dispatch_event(&self, evt: &mut dyn AnyEvent, coordinator: &EventCoordinator) -> Result<()> {
        let owned = evt
            .base()
            .target()
            .is_some_and(|target| target.coordinator_id() == coordinator.id());
        if owned {
            propagate_event(evt, coordinator.dispatcher().paths())?;
        }
        evt.base_mut().stop_dispatch();
        Ok(())
    }
}
