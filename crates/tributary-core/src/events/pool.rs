//! Type-keyed pool of reusable event instances

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::event::{Event, EventHandle, EventPayload, EventTypeId};
use crate::pool::ObjectPool;

/// Free-lists of released events, one per payload type
///
/// Instances obtained with [`get`](Self::get) start with one acquisition.
/// When the last acquisition is released the instance is reset and comes
/// back here for the next `get` of the same payload type.
#[derive(Debug)]
pub struct EventPool {
    free: RefCell<HashMap<EventTypeId, ObjectPool<EventHandle>>>,
    max_per_type: usize,
}

impl EventPool {
    /// Create a pool retaining at most `max_per_type` spare instances per type (0 means unbounded)
    pub fn new(max_per_type: usize) -> Rc<Self> {
        Rc::new(Self {
            free: RefCell::new(HashMap::new()),
            max_per_type,
        })
    }

    /// Check out an initialized, acquired event carrying `payload`
    pub fn get<P: EventPayload>(self: &Rc<Self>, payload: P) -> EventHandle {
        let event_type = EventTypeId::of::<P>();
        let spare = self
            .free
            .borrow_mut()
            .get_mut(&event_type)
            .and_then(ObjectPool::take);
        let handle = spare.unwrap_or_else(|| EventHandle::from_event(Event::<P>::default()));

        {
            let mut evt = handle.borrow_mut();
            evt.reinit();
            if let Some(typed) = evt.downcast_mut::<P>() {
                typed.payload = payload;
            }
            let base = evt.base_mut();
            base.attach_pool(Rc::downgrade(self));
            base.acquire();
        }
        handle
    }

    /// Check out an event recording `trigger` as its cause
    pub fn get_triggered_by<P: EventPayload>(
        self: &Rc<Self>,
        payload: P,
        trigger: &EventHandle,
    ) -> EventHandle {
        let trigger_id = trigger.event_id();
        let handle = self.get(payload);
        handle.borrow_mut().base_mut().set_trigger_event_id(trigger_id);
        handle
    }

    /// Spare instances held for payload type `P`
    pub fn available<P: EventPayload>(&self) -> usize {
        self.free
            .borrow()
            .get(&EventTypeId::of::<P>())
            .map_or(0, ObjectPool::len)
    }

    /// Drop every spare instance
    pub fn clear(&self) {
        self.free.borrow_mut().clear();
    }

    pub(crate) fn give_back(&self, event_type: EventTypeId, handle: EventHandle) {
        let kept = self
            .free
            .borrow_mut()
            .entry(event_type)
            .or_insert_with(|| ObjectPool::new(self.max_per_type))
            .release(handle);
        if !kept {
            tracing::trace!(event_type = %event_type, "Event pool full, dropping instance");
        }
    }
}
