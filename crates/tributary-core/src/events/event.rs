//! Typed events, type-erased access, and shared handles

use std::any::{Any, TypeId};
use std::cell::{BorrowMutError, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::base::{EventBase, Propagation};

/// Data carried by an event
///
/// Payloads are plain data. `Default` is used to reset pooled instances, and
/// [`propagation`](Self::propagation) supplies the flags every new instance
/// of the type starts with.
pub trait EventPayload: Default + 'static {
    /// Propagation flags applied on every init
    fn propagation() -> Propagation {
        Propagation::empty()
    }
}

// ============================================================================
// Event type identifiers
// ============================================================================

/// Stable numeric token identifying a payload type
///
/// Assigned on first use and constant for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventTypeId(u32);

#[derive(Default)]
struct TypeRegistry {
    ids: HashMap<TypeId, EventTypeId>,
    names: Vec<&'static str>,
}

fn type_registry() -> &'static RwLock<TypeRegistry> {
    static REGISTRY: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(TypeRegistry::default()))
}

impl EventTypeId {
    /// Identifier for payload type `P`, registering it if needed
    pub fn of<P: 'static>() -> Self {
        let key = TypeId::of::<P>();
        if let Some(id) = type_registry().read().ids.get(&key) {
            return *id;
        }

        let mut registry = type_registry().write();
        if let Some(id) = registry.ids.get(&key) {
            return *id;
        }
        let id = EventTypeId(registry.names.len() as u32);
        registry.names.push(std::any::type_name::<P>());
        registry.ids.insert(key, id);
        tracing::trace!(event_type = id.0, name = std::any::type_name::<P>(), "Registered event type");
        id
    }

    /// Raw numeric value
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Rust type name of the payload
    pub fn name(self) -> &'static str {
        type_registry()
            .read()
            .names
            .get(self.0 as usize)
            .copied()
            .unwrap_or("<unregistered>")
    }
}

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Typed event
// ============================================================================

/// An event: propagation state plus a payload
///
/// Dereferences to [`EventBase`], so flag and target accessors are available
/// directly on the event.
#[derive(Debug)]
pub struct Event<P> {
    base: EventBase,
    /// Carried data
    pub payload: P,
}

impl<P: EventPayload> Event<P> {
    /// Create an unpooled event with the payload type's default flags
    pub fn new(payload: P) -> Self {
        Self {
            base: EventBase::new(P::propagation()),
            payload,
        }
    }

    /// Propagation state
    pub fn base(&self) -> &EventBase {
        &self.base
    }

    /// Mutable propagation state
    pub fn base_mut(&mut self) -> &mut EventBase {
        &mut self.base
    }
}

impl<P: EventPayload> Default for Event<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

impl<P> Deref for Event<P> {
    type Target = EventBase;

    fn deref(&self) -> &EventBase {
        &self.base
    }
}

impl<P> DerefMut for Event<P> {
    fn deref_mut(&mut self) -> &mut EventBase {
        &mut self.base
    }
}

// ============================================================================
// Type-erased access
// ============================================================================

/// Object-safe view of any [`Event<P>`]
pub trait AnyEvent: Any {
    /// Propagation state
    fn base(&self) -> &EventBase;

    /// Mutable propagation state
    fn base_mut(&mut self) -> &mut EventBase;

    /// Identifier of the payload type
    fn event_type(&self) -> EventTypeId;

    /// Reset state and payload for reuse
    fn reinit(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<P: EventPayload> AnyEvent for Event<P> {
    fn base(&self) -> &EventBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EventBase {
        &mut self.base
    }

    fn event_type(&self) -> EventTypeId {
        EventTypeId::of::<P>()
    }

    fn reinit(&mut self) {
        self.base.init(P::propagation());
        self.payload = P::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl dyn AnyEvent {
    /// Whether the event carries a `P` payload
    pub fn is<P: EventPayload>(&self) -> bool {
        self.event_type() == EventTypeId::of::<P>()
    }

    pub fn downcast_ref<P: EventPayload>(&self) -> Option<&Event<P>> {
        self.as_any().downcast_ref::<Event<P>>()
    }

    pub fn downcast_mut<P: EventPayload>(&mut self) -> Option<&mut Event<P>> {
        self.as_any_mut().downcast_mut::<Event<P>>()
    }
}

// ============================================================================
// Shared handle
// ============================================================================

/// Shared, reference-counted handle to an event of any payload type
///
/// This is what gets sent, queued and pooled. Cloning the handle does not
/// change the event's acquire count; use [`acquire`](Self::acquire) and
/// [`release`](Self::release) for that.
#[derive(Clone)]
pub struct EventHandle {
    inner: Rc<RefCell<dyn AnyEvent>>,
}

impl EventHandle {
    /// Wrap a fresh, unpooled event
    pub fn new<P: EventPayload>(payload: P) -> Self {
        Self::from_event(Event::new(payload))
    }

    /// Wrap an already configured event
    pub fn from_event<P: EventPayload>(event: Event<P>) -> Self {
        let inner: Rc<RefCell<dyn AnyEvent>> = Rc::new(RefCell::new(event));
        Self { inner }
    }

    /// Borrow the event
    ///
    /// # Panics
    ///
    /// Panics if the event is currently being dispatched (mutably borrowed).
    pub fn borrow(&self) -> Ref<'_, dyn AnyEvent> {
        self.inner.borrow()
    }

    /// Mutably borrow the event
    ///
    /// # Panics
    ///
    /// Panics if the event is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, dyn AnyEvent> {
        self.inner.borrow_mut()
    }

    pub(crate) fn try_borrow_mut(&self) -> Result<RefMut<'_, dyn AnyEvent>, BorrowMutError> {
        self.inner.try_borrow_mut()
    }

    /// Identifier of the payload type
    pub fn event_type(&self) -> EventTypeId {
        self.inner.borrow().event_type()
    }

    /// Current event id
    pub fn event_id(&self) -> u64 {
        self.inner.borrow().base().event_id()
    }

    /// Run `f` against the typed event, if the payload type matches
    pub fn with<P: EventPayload, R>(&self, f: impl FnOnce(&Event<P>) -> R) -> Option<R> {
        let evt = self.inner.borrow();
        let result = evt.downcast_ref::<P>().map(f);
        result
    }

    /// Run `f` against the mutable typed event, if the payload type matches
    pub fn with_mut<P: EventPayload, R>(&self, f: impl FnOnce(&mut Event<P>) -> R) -> Option<R> {
        let mut evt = self.inner.borrow_mut();
        let result = evt.downcast_mut::<P>().map(f);
        result
    }

    /// Take one reference on the event
    pub fn acquire(&self) {
        self.inner.borrow_mut().base_mut().acquire();
    }

    /// Drop one reference; the last release of a pooled event returns it to its pool
    ///
    /// Releasing more times than acquired is a contract violation: it fails a
    /// debug assertion and is otherwise logged and ignored.
    pub fn release(&self) {
        let returned = {
            let mut evt = self.inner.borrow_mut();
            let event_id = evt.base().event_id();
            match evt.base_mut().release_ref() {
                None => {
                    tracing::warn!(event_id, "Event released more times than it was acquired");
                    debug_assert!(false, "event {event_id} released more times than it was acquired");
                    return;
                }
                Some(remaining) if remaining > 0 => return,
                Some(_) => {}
            }
            if !evt.base().is_pooled() {
                return;
            }
            let origin = evt.base_mut().detach_pool();
            let event_type = evt.event_type();
            evt.reinit();
            origin.map(|pool| (pool, event_type))
        };

        if let Some((pool, event_type)) = returned {
            if let Some(pool) = pool.upgrade() {
                pool.give_back(event_type, self.clone());
            }
        }
    }

    /// Whether two handles refer to the same instance
    pub fn ptr_eq(&self, other: &EventHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(evt) => f
                .debug_struct("EventHandle")
                .field("event_id", &evt.base().event_id())
                .field("event_type", &evt.event_type())
                .field("ref_count", &evt.base().ref_count())
                .finish(),
            Err(_) => f.write_str("EventHandle(<dispatching>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Ping(u32);

    impl EventPayload for Ping {}

    #[derive(Debug, Default)]
    struct Bubbly;

    impl EventPayload for Bubbly {
        fn propagation() -> Propagation {
            Propagation::BUBBLES | Propagation::TRICKLES_DOWN
        }
    }

    #[test]
    fn test_type_ids_are_stable_and_distinct() {
        assert_eq!(EventTypeId::of::<Ping>(), EventTypeId::of::<Ping>());
        assert_ne!(EventTypeId::of::<Ping>(), EventTypeId::of::<Bubbly>());
        assert!(EventTypeId::of::<Ping>().name().ends_with("Ping"));
    }

    #[test]
    fn test_payload_propagation_defaults() {
        let evt = Event::new(Bubbly);
        assert!(evt.bubbles());
        assert!(evt.trickles_down());
        assert!(!Event::new(Ping(1)).bubbles_or_trickles_down());
    }

    #[test]
    fn test_downcast() {
        let handle = EventHandle::new(Ping(7));
        assert!(handle.borrow().is::<Ping>());
        assert!(!handle.borrow().is::<Bubbly>());
        assert_eq!(handle.with::<Ping, _>(|e| e.payload.0), Some(7));
        assert_eq!(handle.with::<Bubbly, _>(|_| ()), None);

        handle.with_mut::<Ping, _>(|e| e.payload.0 = 8);
        assert_eq!(handle.with::<Ping, _>(|e| e.payload.0), Some(8));
    }

    #[test]
    fn test_reinit_resets_payload() {
        let mut evt = Event::new(Ping(3));
        evt.stop_propagation();
        AnyEvent::reinit(&mut evt);
        assert_eq!(evt.payload, Ping(0));
        assert!(!evt.is_propagation_stopped());
    }

    #[test]
    fn test_unpooled_release_keeps_instance() {
        let handle = EventHandle::new(Ping(1));
        let id = handle.event_id();
        handle.acquire();
        handle.release();
        assert_eq!(handle.event_id(), id);
        assert_eq!(handle.borrow().base().ref_count(), 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "released more times than it was acquired")]
    fn test_over_release_fails_debug_assertion() {
        let handle = EventHandle::new(Ping(1));
        handle.release();
    }

    #[test]
    fn test_handle_identity() {
        let a = EventHandle::new(Ping(1));
        let b = a.clone();
        let c = EventHandle::new(Ping(1));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
