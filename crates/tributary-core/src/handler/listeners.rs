//! Registration call-site tracking for debugging tools

use std::collections::HashMap;
use std::panic::Location;

use serde::Serialize;

use super::callback::{CallbackIdentity, TrickleDown};
use super::HandlerId;
use crate::events::EventTypeId;

/// Where and how a callback was registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerRecord {
    pub callback: CallbackIdentity,
    pub event_type: &'static str,
    pub trickle_down: TrickleDown,
    pub file: &'static str,
    pub line: u32,
}

impl ListenerRecord {
    pub(crate) fn new(
        callback: CallbackIdentity,
        event_type: EventTypeId,
        trickle_down: TrickleDown,
        location: &'static Location<'static>,
    ) -> Self {
        Self {
            callback,
            event_type: event_type.name(),
            trickle_down,
            file: location.file(),
            line: location.line(),
        }
    }
}

/// Listener records keyed by handler, then by event type
#[derive(Debug, Clone, Default)]
pub struct ListenerTable {
    records: HashMap<HandlerId, HashMap<EventTypeId, Vec<ListenerRecord>>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, handler: HandlerId, event_type: EventTypeId, record: ListenerRecord) {
        let records = self
            .records
            .entry(handler)
            .or_default()
            .entry(event_type)
            .or_default();
        let duplicate = records
            .iter()
            .any(|r| r.callback == record.callback && r.trickle_down == record.trickle_down);
        if !duplicate {
            records.push(record);
        }
    }

    pub(crate) fn remove(
        &mut self,
        handler: HandlerId,
        event_type: EventTypeId,
        callback: CallbackIdentity,
        trickle_down: TrickleDown,
    ) {
        let Some(by_type) = self.records.get_mut(&handler) else {
            return;
        };
        if let Some(records) = by_type.get_mut(&event_type) {
            records.retain(|r| !(r.callback == callback && r.trickle_down == trickle_down));
            if records.is_empty() {
                by_type.remove(&event_type);
            }
        }
        if by_type.is_empty() {
            self.records.remove(&handler);
        }
    }

    /// Drop every record of a handler
    pub fn remove_handler(&mut self, handler: HandlerId) {
        self.records.remove(&handler);
    }

    /// All records of a handler, in no particular order
    pub fn records_for(&self, handler: HandlerId) -> Vec<&ListenerRecord> {
        self.records
            .get(&handler)
            .map(|by_type| by_type.values().flatten().collect())
            .unwrap_or_default()
    }

    /// Records of a handler for one event type, in registration order
    pub fn records_for_type(&self, handler: HandlerId, event_type: EventTypeId) -> &[ListenerRecord] {
        self.records
            .get(&handler)
            .and_then(|by_type| by_type.get(&event_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of handlers with at least one record
    pub fn handler_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
