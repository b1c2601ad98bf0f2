//! Event objects
//!
//! An event is an [`EventBase`] (propagation flags, lifecycle flags, targets,
//! phase, attached path) plus a typed payload. Events are addressed through
//! [`EventHandle`], a shared handle over the type-erased [`AnyEvent`] view, so
//! the dispatcher can queue and route events of any payload type.
//!
//! # Lifecycle
//!
//! ```text
//! EventPool::get ──▶ init ──▶ acquire ──▶ set_target ──▶ dispatch ──▶ release
//!       ▲                                                               │
//!       └─────────────────── reinit when refcount hits 0 ◀──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct Clicked { button: u8 }
//!
//! impl EventPayload for Clicked {
//!     fn propagation() -> Propagation {
//!         Propagation::BUBBLES | Propagation::TRICKLES_DOWN | Propagation::CANCELLABLE
//!     }
//! }
//!
//! let evt = coordinator.events().get(Clicked { button: 1 });
//! button.send_event(&evt)?;
//! evt.release();
//! ```

mod base;
mod event;
mod pool;

pub use base::{EventBase, LifecycleStatus, Propagation, PropagationPhase};
pub use event::{AnyEvent, Event, EventHandle, EventPayload, EventTypeId};
pub use pool::EventPool;
