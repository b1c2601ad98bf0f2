//! Propagation state shared by every event
//!
//! [`EventBase`] holds everything the dispatcher reads and writes while an
//! event travels the hierarchy: flags, targets, the current phase, and the
//! propagation path attached for the duration of a dispatch.

use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::dispatch::PropagationPath;
use crate::events::EventPool;
use crate::handler::{CallbackHandler, HandlerId};

bitflags! {
    /// How an event travels through the hierarchy
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Propagation: u8 {
        /// Visit ancestors from the target outward after the target phase
        const BUBBLES = 1;
        /// Visit ancestors from the root inward before the target phase
        const TRICKLES_DOWN = 1 << 1;
        /// `prevent_default` has an effect
        const CANCELLABLE = 1 << 2;
        /// Disabled handlers only run callbacks registered with `IncludeDisabled`
        const SKIP_DISABLED = 1 << 3;
        /// Treat composite roots as ordinary ancestors
        const IGNORE_COMPOSITE_ROOTS = 1 << 4;
    }
}

bitflags! {
    /// Where an event is in its dispatch lifecycle
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LifecycleStatus: u8 {
        const PROPAGATION_STOPPED = 1;
        const IMMEDIATE_PROPAGATION_STOPPED = 1 << 1;
        const DEFAULT_PREVENTED = 1 << 2;
        const DISPATCHING = 1 << 3;
        const POOLED = 1 << 4;
        const STOP_DISPATCH = 1 << 5;
        const DISPATCHED = 1 << 6;
        const PROCESSED = 1 << 7;
    }
}

/// Phase an event is currently being delivered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationPhase {
    /// Not being propagated
    #[default]
    None,
    /// Travelling from the root toward the target's parent
    TrickleDown,
    /// Delivered to the target (and composite roots standing in for it)
    AtTarget,
    /// Running default actions on the target
    DefaultActionAtTarget,
    /// Travelling from the target's parent back to the root
    BubbleUp,
    /// Running the final default action on the dispatched target
    DefaultAction,
}

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_event_id() -> u64 {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Milliseconds elapsed since the first event was created in this process
fn now_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// Propagation state carried by every [`Event`](crate::events::Event)
#[derive(Debug)]
pub struct EventBase {
    event_id: u64,
    trigger_event_id: u64,
    timestamp_ms: u64,
    propagation: Propagation,
    status: LifecycleStatus,
    phase: PropagationPhase,
    target: Option<Rc<CallbackHandler>>,
    leaf_target: Option<Rc<CallbackHandler>>,
    current_target: Option<Rc<CallbackHandler>>,
    path: Option<PropagationPath>,
    skipped: Vec<HandlerId>,
    ref_count: u32,
    origin: Option<Weak<EventPool>>,
}

impl EventBase {
    pub(crate) fn new(propagation: Propagation) -> Self {
        Self {
            event_id: next_event_id(),
            trigger_event_id: 0,
            timestamp_ms: now_ms(),
            propagation,
            status: LifecycleStatus::empty(),
            phase: PropagationPhase::None,
            target: None,
            leaf_target: None,
            current_target: None,
            path: None,
            skipped: Vec::new(),
            ref_count: 0,
            origin: None,
        }
    }

    /// Reset every flag and reference, and assign a fresh id and timestamp
    pub(crate) fn init(&mut self, propagation: Propagation) {
        if self.ref_count != 0 {
            tracing::warn!(
                event_id = self.event_id,
                ref_count = self.ref_count,
                "Event re-initialized while still referenced"
            );
            self.ref_count = 0;
        }
        self.event_id = next_event_id();
        self.trigger_event_id = 0;
        self.timestamp_ms = now_ms();
        self.propagation = propagation;
        self.status = LifecycleStatus::empty();
        self.phase = PropagationPhase::None;
        self.target = None;
        self.leaf_target = None;
        self.current_target = None;
        self.path = None;
        self.skipped.clear();
        self.origin = None;
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Monotonically increasing identifier, reassigned on every init
    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    /// Id of the event that caused this one, or 0
    pub fn trigger_event_id(&self) -> u64 {
        self.trigger_event_id
    }

    /// Record the event that caused this one
    pub fn set_trigger_event_id(&mut self, id: u64) {
        self.trigger_event_id = id;
    }

    /// Creation time in milliseconds since the process epoch
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    // ========================================================================
    // Propagation flags
    // ========================================================================

    /// All propagation flags
    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Replace all propagation flags
    pub fn set_propagation(&mut self, propagation: Propagation) {
        self.propagation = propagation;
    }

    pub fn bubbles(&self) -> bool {
        self.propagation.contains(Propagation::BUBBLES)
    }

    pub fn set_bubbles(&mut self, value: bool) {
        self.propagation.set(Propagation::BUBBLES, value);
    }

    pub fn trickles_down(&self) -> bool {
        self.propagation.contains(Propagation::TRICKLES_DOWN)
    }

    pub fn set_trickles_down(&mut self, value: bool) {
        self.propagation.set(Propagation::TRICKLES_DOWN, value);
    }

    pub fn cancellable(&self) -> bool {
        self.propagation.contains(Propagation::CANCELLABLE)
    }

    pub fn set_cancellable(&mut self, value: bool) {
        self.propagation.set(Propagation::CANCELLABLE, value);
    }

    pub fn skip_disabled(&self) -> bool {
        self.propagation.contains(Propagation::SKIP_DISABLED)
    }

    pub fn set_skip_disabled(&mut self, value: bool) {
        self.propagation.set(Propagation::SKIP_DISABLED, value);
    }

    pub fn ignore_composite_roots(&self) -> bool {
        self.propagation.contains(Propagation::IGNORE_COMPOSITE_ROOTS)
    }

    pub fn set_ignore_composite_roots(&mut self, value: bool) {
        self.propagation.set(Propagation::IGNORE_COMPOSITE_ROOTS, value);
    }

    /// Whether the event needs a propagation path at all
    pub fn bubbles_or_trickles_down(&self) -> bool {
        self.propagation
            .intersects(Propagation::BUBBLES | Propagation::TRICKLES_DOWN)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// All lifecycle flags
    pub fn status(&self) -> LifecycleStatus {
        self.status
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.status.contains(LifecycleStatus::PROPAGATION_STOPPED)
    }

    /// Stop delivery to further handlers
    ///
    /// Remaining callbacks on the current handler still run, as do default
    /// actions on the target.
    pub fn stop_propagation(&mut self) {
        self.status.insert(LifecycleStatus::PROPAGATION_STOPPED);
    }

    pub fn is_immediate_propagation_stopped(&self) -> bool {
        self.status
            .contains(LifecycleStatus::IMMEDIATE_PROPAGATION_STOPPED)
    }

    /// Stop delivery to further handlers and to the remaining callbacks of the current one
    pub fn stop_immediate_propagation(&mut self) {
        self.status.insert(
            LifecycleStatus::PROPAGATION_STOPPED | LifecycleStatus::IMMEDIATE_PROPAGATION_STOPPED,
        );
    }

    pub(crate) fn clear_immediate_propagation_stopped(&mut self) {
        self.status
            .remove(LifecycleStatus::IMMEDIATE_PROPAGATION_STOPPED);
    }

    pub fn is_default_prevented(&self) -> bool {
        self.status.contains(LifecycleStatus::DEFAULT_PREVENTED)
    }

    /// Suppress default actions; ignored unless the event is cancellable
    pub fn prevent_default(&mut self) {
        if self.cancellable() {
            self.status.insert(LifecycleStatus::DEFAULT_PREVENTED);
        }
    }

    pub fn is_dispatching(&self) -> bool {
        self.status.contains(LifecycleStatus::DISPATCHING)
    }

    pub(crate) fn set_dispatching(&mut self, value: bool) {
        if value {
            self.status
                .insert(LifecycleStatus::DISPATCHING | LifecycleStatus::DISPATCHED);
        } else {
            self.status.remove(LifecycleStatus::DISPATCHING);
        }
    }

    /// Whether the event has been handed to a dispatcher since its last init
    pub fn is_dispatched(&self) -> bool {
        self.status.contains(LifecycleStatus::DISPATCHED)
    }

    /// Whether the dispatcher finished processing the event
    pub fn is_processed(&self) -> bool {
        self.status.contains(LifecycleStatus::PROCESSED)
    }

    pub(crate) fn set_processed(&mut self) {
        self.status.insert(LifecycleStatus::PROCESSED);
    }

    /// Whether the instance came from an [`EventPool`] and is checked out
    pub fn is_pooled(&self) -> bool {
        self.status.contains(LifecycleStatus::POOLED)
    }

    /// Whether a strategy asked the dispatcher to skip remaining strategies
    pub fn is_dispatch_stopped(&self) -> bool {
        self.status.contains(LifecycleStatus::STOP_DISPATCH)
    }

    /// Skip the remaining dispatching strategies for this event
    pub fn stop_dispatch(&mut self) {
        self.status.insert(LifecycleStatus::STOP_DISPATCH);
    }

    /// Flag the event as owned by a dispatcher
    ///
    /// # Panics
    ///
    /// Panics if the instance was already dispatched since its last init.
    pub(crate) fn mark_received_by_dispatcher(&mut self) {
        assert!(
            !self.is_dispatched(),
            "event {} cannot be dispatched more than once; send a fresh instance",
            self.event_id
        );
        self.status.insert(LifecycleStatus::DISPATCHED);
    }

    // ========================================================================
    // Targets and phase
    // ========================================================================

    pub fn phase(&self) -> PropagationPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: PropagationPhase) {
        self.phase = phase;
    }

    /// Handler the event is addressed to
    ///
    /// Composite roots temporarily replace this during the target phase.
    pub fn target(&self) -> Option<&Rc<CallbackHandler>> {
        self.target.as_ref()
    }

    /// Address the event; the first non-empty target also becomes the leaf target
    pub fn set_target(&mut self, target: Option<Rc<CallbackHandler>>) {
        if self.leaf_target.is_none() {
            self.leaf_target = target.clone();
        }
        self.target = target;
    }

    /// Handler the event was originally addressed to
    pub fn leaf_target(&self) -> Option<&Rc<CallbackHandler>> {
        self.leaf_target.as_ref()
    }

    pub(crate) fn reset_target_to_leaf(&mut self) {
        self.target = self.leaf_target.clone();
    }

    /// Handler whose callbacks are running right now
    pub fn current_target(&self) -> Option<&Rc<CallbackHandler>> {
        self.current_target.as_ref()
    }

    pub(crate) fn set_current_target(&mut self, handler: Option<Rc<CallbackHandler>>) {
        self.current_target = handler;
    }

    /// Path attached while the event is in flight
    pub fn path(&self) -> Option<&PropagationPath> {
        self.path.as_ref()
    }

    pub(crate) fn set_path(&mut self, path: PropagationPath) -> Option<PropagationPath> {
        self.path.replace(path)
    }

    pub(crate) fn take_path(&mut self) -> Option<PropagationPath> {
        self.path.take()
    }

    /// Exclude a handler from every phase of this event, including target visits
    ///
    /// Returns `false` if the handler was already excluded.
    pub fn skip_handler(&mut self, handler: HandlerId) -> bool {
        if self.skipped.contains(&handler) {
            return false;
        }
        self.skipped.push(handler);
        true
    }

    /// Whether `handler` was excluded with [`skip_handler`](Self::skip_handler)
    pub fn skips(&self, handler: HandlerId) -> bool {
        self.skipped.contains(&handler)
    }

    // ========================================================================
    // Reference counting
    // ========================================================================

    /// Outstanding acquisitions
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub(crate) fn acquire(&mut self) {
        self.ref_count += 1;
    }

    /// Drop one acquisition and return how many remain
    ///
    /// Returns `None` when there was nothing to release.
    pub(crate) fn release_ref(&mut self) -> Option<u32> {
        if self.ref_count == 0 {
            return None;
        }
        self.ref_count -= 1;
        Some(self.ref_count)
    }

    pub(crate) fn attach_pool(&mut self, pool: Weak<EventPool>) {
        self.origin = Some(pool);
        self.status.insert(LifecycleStatus::POOLED);
    }

    pub(crate) fn detach_pool(&mut self) -> Option<Weak<EventPool>> {
        self.status.remove(LifecycleStatus::POOLED);
        self.origin.take()
    }
}

impl Default for EventBase {
    fn default() -> Self {
        Self::new(Propagation::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let a = EventBase::default();
        let b = EventBase::default();
        assert!(b.event_id() > a.event_id());
    }

    #[test]
    fn test_prevent_default_requires_cancellable() {
        let mut base = EventBase::default();
        base.prevent_default();
        assert!(!base.is_default_prevented());

        base.set_cancellable(true);
        base.prevent_default();
        assert!(base.is_default_prevented());
    }

    #[test]
    fn test_stop_immediate_implies_stop() {
        let mut base = EventBase::default();
        base.stop_immediate_propagation();
        assert!(base.is_propagation_stopped());
        assert!(base.is_immediate_propagation_stopped());

        base.clear_immediate_propagation_stopped();
        assert!(base.is_propagation_stopped());
        assert!(!base.is_immediate_propagation_stopped());
    }

    #[test]
    fn test_init_resets_everything() {
        let mut base = EventBase::new(Propagation::BUBBLES);
        let first_id = base.event_id();
        base.set_trigger_event_id(42);
        base.stop_propagation();
        base.set_phase(PropagationPhase::BubbleUp);
        base.skip_handler(HandlerId::from_raw(9));
        base.acquire();

        base.init(Propagation::TRICKLES_DOWN);

        assert!(base.event_id() > first_id);
        assert_eq!(base.trigger_event_id(), 0);
        assert_eq!(base.status(), LifecycleStatus::empty());
        assert_eq!(base.phase(), PropagationPhase::None);
        assert_eq!(base.propagation(), Propagation::TRICKLES_DOWN);
        assert!(!base.skips(HandlerId::from_raw(9)));
        assert_eq!(base.ref_count(), 0);
    }

    #[test]
    fn test_release_ref_detects_over_release() {
        let mut base = EventBase::default();
        base.acquire();
        base.acquire();
        assert_eq!(base.release_ref(), Some(1));
        assert_eq!(base.release_ref(), Some(0));
        assert_eq!(base.release_ref(), None);
    }

    #[test]
    fn test_skip_handler_is_deduplicated() {
        let mut base = EventBase::default();
        assert!(base.skip_handler(HandlerId::from_raw(3)));
        assert!(!base.skip_handler(HandlerId::from_raw(3)));
        assert!(base.skips(HandlerId::from_raw(3)));
    }

    #[test]
    #[should_panic(expected = "cannot be dispatched more than once")]
    fn test_second_dispatch_panics() {
        let mut base = EventBase::default();
        base.mark_received_by_dispatcher();
        base.mark_received_by_dispatcher();
    }

    #[test]
    fn test_flag_setters() {
        let mut base = EventBase::default();
        assert!(!base.bubbles_or_trickles_down());
        base.set_trickles_down(true);
        assert!(base.bubbles_or_trickles_down());
        base.set_bubbles(true);
        base.set_trickles_down(false);
        assert!(base.bubbles());
        assert!(!base.trickles_down());
        base.set_skip_disabled(true);
        base.set_ignore_composite_roots(true);
        assert!(base.skip_disabled());
        assert!(base.ignore_composite_roots());
    }
}
