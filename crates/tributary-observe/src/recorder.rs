//! Observer that records every processed event

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use tributary_core::{AnyEvent, DispatchObserver, EventCoordinator, EventTypeId};

use crate::record::DispatchRecord;

/// Records dispatches and optionally swallows them
///
/// # Suspension
///
/// A suspended recorder intercepts events so no handler sees them. With an
/// intercept filter set, only events of the listed types are intercepted
/// and everything else flows normally. Intercepted events are still
/// recorded, flagged with [`DispatchRecord::intercepted`].
#[derive(Debug, Default)]
pub struct EventRecorder {
    records: RefCell<Vec<DispatchRecord>>,
    counts: RefCell<BTreeMap<String, u64>>,
    suspended: Cell<bool>,
    intercept_filter: RefCell<HashSet<EventTypeId>>,
    intercepted: RefCell<HashSet<u64>>,
    refreshes: Cell<u64>,
    connected: Cell<bool>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder and attach it to `coordinator`
    pub fn attach(coordinator: &EventCoordinator) -> Rc<Self> {
        let recorder = Rc::new(Self::new());
        coordinator.attach_observer(recorder.clone());
        recorder.connected.set(true);
        tracing::debug!(coordinator = %coordinator.id(), "Attached event recorder");
        recorder
    }

    /// Whether the recorder is attached through [`attach`](Self::attach) and not yet disconnected
    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    // ========================================================================
    // Suspension
    // ========================================================================

    pub fn suspend(&self) {
        self.suspended.set(true);
    }

    pub fn resume(&self) {
        self.suspended.set(false);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.get()
    }

    /// Restrict interception to `types`; an empty set intercepts everything
    pub fn intercept_only(&self, types: impl IntoIterator<Item = EventTypeId>) {
        let mut filter = self.intercept_filter.borrow_mut();
        filter.clear();
        filter.extend(types);
    }

    fn should_intercept(&self, evt: &dyn AnyEvent) -> bool {
        if !self.suspended.get() {
            return false;
        }
        let filter = self.intercept_filter.borrow();
        filter.is_empty() || filter.contains(&evt.event_type())
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Snapshot of every record, oldest first
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Events recorded per payload type name
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.counts.borrow().clone()
    }

    pub fn count_of(&self, event_type: EventTypeId) -> u64 {
        self.counts
            .borrow()
            .get(event_type.name())
            .copied()
            .unwrap_or(0)
    }

    /// Number of refresh notifications received
    pub fn refreshes(&self) -> u64 {
        self.refreshes.get()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
        self.counts.borrow_mut().clear();
        self.intercepted.borrow_mut().clear();
    }
}

impl DispatchObserver for EventRecorder {
    fn intercept_event(&self, evt: &dyn AnyEvent) -> bool {
        let intercept = self.should_intercept(evt);
        if intercept {
            self.intercepted.borrow_mut().insert(evt.base().event_id());
            tracing::trace!(event_id = evt.base().event_id(), "Recorder intercepted event");
        }
        intercept
    }

    fn post_process_event(&self, evt: &dyn AnyEvent) {
        let intercepted = self.intercepted.borrow_mut().remove(&evt.base().event_id());
        let record = DispatchRecord::capture(evt, intercepted);
        *self
            .counts
            .borrow_mut()
            .entry(record.event_type.clone())
            .or_insert(0) += 1;
        self.records.borrow_mut().push(record);
    }

    fn refresh(&self) {
        self.refreshes.set(self.refreshes.get() + 1);
    }

    fn disconnect(&self) {
        self.connected.set(false);
        self.intercepted.borrow_mut().clear();
        tracing::debug!(records = self.len(), "Event recorder disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_core::{EventCallback, EventHandle, EventPayload, Propagation, TrickleDown};

    #[derive(Debug, Default)]
    struct Key;

    impl EventPayload for Key {
        fn propagation() -> Propagation {
            Propagation::BUBBLES | Propagation::CANCELLABLE
        }
    }

    #[derive(Debug, Default)]
    struct Scroll;

    impl EventPayload for Scroll {}

    fn counting<P: EventPayload>(hits: &Rc<Cell<u32>>) -> EventCallback<P> {
        let hits = Rc::clone(hits);
        EventCallback::new(move |_| {
            hits.set(hits.get() + 1);
            Ok(())
        })
    }

    #[test]
    fn test_records_and_counts() {
        let coordinator = EventCoordinator::new();
        let recorder = EventRecorder::attach(&coordinator);
        let node = coordinator.handler("node").build();

        node.send_event(&EventHandle::new(Key)).unwrap();
        node.send_event(&EventHandle::new(Key)).unwrap();
        node.send_event(&EventHandle::new(Scroll)).unwrap();

        assert_eq!(recorder.len(), 3);
        assert_eq!(recorder.count_of(EventTypeId::of::<Key>()), 2);
        assert_eq!(recorder.count_of(EventTypeId::of::<Scroll>()), 1);
        assert!(recorder.refreshes() >= 3);
        assert!(recorder.records().iter().all(|r| r.target.as_deref() == Some("node")));

        recorder.clear();
        assert!(recorder.is_empty());
        assert!(recorder.counts().is_empty());
    }

    #[test]
    fn test_suspended_recorder_intercepts() {
        let coordinator = EventCoordinator::new();
        let recorder = EventRecorder::attach(&coordinator);
        let node = coordinator.handler("node").build();
        let hits = Rc::new(Cell::new(0));
        node.register_callback(&counting::<Key>(&hits), TrickleDown::NoTrickleDown);

        recorder.suspend();
        node.send_event(&EventHandle::new(Key)).unwrap();
        assert_eq!(hits.get(), 0);

        recorder.resume();
        node.send_event(&EventHandle::new(Key)).unwrap();
        assert_eq!(hits.get(), 1);

        let records = recorder.records();
        assert!(records[0].intercepted);
        assert!(records[0].propagation_stopped);
        assert!(records[0].default_prevented);
        assert!(!records[1].intercepted);
    }

    #[test]
    fn test_intercept_filter_limits_types() {
        let coordinator = EventCoordinator::new();
        let recorder = EventRecorder::attach(&coordinator);
        let node = coordinator.handler("node").build();
        let key_hits = Rc::new(Cell::new(0));
        let scroll_hits = Rc::new(Cell::new(0));
        node.register_callback(&counting::<Key>(&key_hits), TrickleDown::NoTrickleDown);
        node.register_callback(&counting::<Scroll>(&scroll_hits), TrickleDown::NoTrickleDown);

        recorder.intercept_only([EventTypeId::of::<Scroll>()]);
        recorder.suspend();
        node.send_event(&EventHandle::new(Key)).unwrap();
        node.send_event(&EventHandle::new(Scroll)).unwrap();

        assert_eq!((key_hits.get(), scroll_hits.get()), (1, 0));
    }

    #[test]
    fn test_coordinator_drop_disconnects() {
        let coordinator = EventCoordinator::new();
        let recorder = EventRecorder::attach(&coordinator);
        assert!(recorder.is_connected());
        drop(coordinator);
        assert!(!recorder.is_connected());
    }
}
