//! Phase walk over a built propagation path
//!
//! Events that bubble or trickle down go through:
//!
//! ```text
//! TrickleDown ─▶ AtTarget ─▶ BubbleUp ─▶ DefaultActionAtTarget ─▶ (DefaultAction) ─▶ None
//! ```
//!
//! `DefaultActionAtTarget` waits until bubble-up has finished, so every
//! ancestor can still prevent it. Runtimes that run it between `AtTarget`
//! and `BubbleUp` give ancestors no such chance.
//!
//! `DefaultAction` runs later, from the dispatcher, once per target. Events
//! that do neither take the fast path: `AtTarget` then
//! `DefaultActionAtTarget` on the target alone, without building a path.
//!
//! Handlers on the event's skip list are left out of every phase, targets
//! included.

use std::rc::Rc;

use super::path::{PathPool, PropagationPath};
use crate::coordinator::CoordinatorId;
use crate::error::Result;
use crate::events::{AnyEvent, PropagationPhase};
use crate::handler::CallbackHandler;

/// Deliver `evt` to its target and, if it propagates, to the target's ancestors
///
/// The path built here stays attached to the event so the dispatcher can run
/// default actions on every target afterwards.
///
/// # Panics
///
/// Panics if the event is already being propagated.
pub fn propagate_event(evt: &mut dyn AnyEvent, paths: &PathPool) -> Result<()> {
    let Some(target) = evt.base().target().cloned() else {
        return Ok(());
    };
    assert!(
        !evt.base().is_dispatching(),
        "event {} is already being propagated; send a fresh instance",
        evt.base().event_id()
    );

    evt.base_mut().set_dispatching(true);
    let result = if evt.base().bubbles_or_trickles_down() {
        handle_event_across_propagation_path(evt, paths)
    } else {
        tracing::trace!(event_id = evt.base().event_id(), handler = %target.name(), "Fast path dispatch");
        target.handle_event_at_target_phase(evt).map_err(Into::into)
    };

    let base = evt.base_mut();
    base.set_phase(PropagationPhase::None);
    base.set_current_target(None);
    base.set_dispatching(false);
    result
}

fn handle_event_across_propagation_path(evt: &mut dyn AnyEvent, paths: &PathPool) -> Result<()> {
    let Some(leaf) = evt.base().leaf_target().cloned() else {
        return Ok(());
    };
    let path = paths.build(&leaf, evt.base());
    let result = walk_path(evt, &path, leaf.coordinator_id());
    evt.base_mut().reset_target_to_leaf();
    if let Some(stale) = evt.base_mut().set_path(path) {
        paths.release(stale);
    }
    result
}

fn walk_path(evt: &mut dyn AnyEvent, path: &PropagationPath, coordinator: CoordinatorId) -> Result<()> {
    let visits = |node: &Rc<CallbackHandler>, evt: &dyn AnyEvent| {
        !evt.base().skips(node.id()) && node.coordinator_id() == coordinator
    };

    if evt.base().trickles_down() {
        evt.base_mut().set_phase(PropagationPhase::TrickleDown);
        for node in path.trickle_down_path().iter().rev() {
            if evt.base().is_propagation_stopped() {
                break;
            }
            if !visits(node, &*evt) {
                continue;
            }
            evt.base_mut().set_current_target(Some(Rc::clone(node)));
            node.handle_event_at_current_target_and_phase(evt)?;
        }
    }

    evt.base_mut().set_phase(PropagationPhase::AtTarget);
    for node in path.target_elements() {
        if !visits(node, &*evt) {
            continue;
        }
        // Stopping immediately only silences the handler that did it
        evt.base_mut().clear_immediate_propagation_stopped();
        evt.base_mut().set_target(Some(Rc::clone(node)));
        evt.base_mut().set_current_target(Some(Rc::clone(node)));
        node.handle_event_at_current_target_and_phase(evt)?;
    }
    evt.base_mut().reset_target_to_leaf();

    if evt.base().bubbles() {
        evt.base_mut().set_phase(PropagationPhase::BubbleUp);
        for node in path.bubble_up_path() {
            if evt.base().is_propagation_stopped() {
                break;
            }
            if !visits(node, &*evt) {
                continue;
            }
            evt.base_mut().set_current_target(Some(Rc::clone(node)));
            node.handle_event_at_current_target_and_phase(evt)?;
        }
    }

    evt.base_mut().set_phase(PropagationPhase::DefaultActionAtTarget);
    for node in path.target_elements() {
        if !visits(node, &*evt) {
            continue;
        }
        evt.base_mut().set_target(Some(Rc::clone(node)));
        evt.base_mut().set_current_target(Some(Rc::clone(node)));
        node.handle_event_at_current_target_and_phase(evt)?;
    }
    Ok(())
}

/// Run the final default action on the event's current target
pub fn execute_default_action(evt: &mut dyn AnyEvent) -> Result<()> {
    let Some(target) = evt.base().target().cloned() else {
        return Ok(());
    };

    let base = evt.base_mut();
    base.set_dispatching(true);
    base.set_current_target(Some(Rc::clone(&target)));
    base.set_phase(PropagationPhase::DefaultAction);

    let result = target.handle_event_at_current_target_and_phase(evt);

    let base = evt.base_mut();
    base.set_phase(PropagationPhase::None);
    base.set_current_target(None);
    base.set_dispatching(false);
    result.map_err(Into::into)
}
