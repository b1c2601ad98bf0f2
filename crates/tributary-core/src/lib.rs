//! Hierarchical event dispatch
//!
//! Events are sent from a [`CallbackHandler`] in a tree of handlers and
//! travel down from the root to the target (trickle-down), run at the
//! target, travel back up (bubble-up), and finish with default actions.
//! Callbacks can stop propagation or prevent default actions along the way.
//!
//! # Architecture
//!
//! - [`events`] - event state, typed payloads, pooling
//! - [`handler`] - tree nodes, callbacks, callback registries
//! - [`dispatch`] - propagation paths, phase walk, dispatcher with gates and queue
//! - [`coordinator`] - owner of a tree: dispatcher, pool, tick queues, observers
//!
//! Everything here is single-threaded: handlers and events are `Rc`-shared
//! and mutated through `Cell`/`RefCell`.
//!
//! # Example
//!
//! ```
//! use tributary_core::{EventCallback, EventCoordinator, EventPayload, Propagation, TrickleDown};
//!
//! #[derive(Default)]
//! struct Clicked;
//!
//! impl EventPayload for Clicked {
//!     fn propagation() -> Propagation {
//!         Propagation::BUBBLES | Propagation::TRICKLES_DOWN
//!     }
//! }
//!
//! let coordinator = EventCoordinator::new();
//! let window = coordinator.handler("window").build();
//! let button = coordinator.handler("button").parent(&window).build();
//!
//! let on_click = EventCallback::<Clicked>::new(|evt| {
//!     println!("clicked {:?}", evt.target().map(|t| t.name().to_string()));
//!     Ok(())
//! });
//! window.register_callback(&on_click, TrickleDown::NoTrickleDown);
//!
//! let evt = coordinator.pooled(Clicked);
//! button.send_event(&evt).unwrap();
//! evt.release();
//! ```

pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handler;
pub mod pool;

pub use coordinator::{CoordinatorId, DispatchObserver, EventCoordinator, TickPhase};
pub use dispatch::{
    DefaultDispatchingStrategy, DispatchMode, DispatcherGate, DispatchingStrategy, EventDispatcher, PathPool,
    PropagationPath,
};
pub use error::{CallbackError, CallbackResult, DispatchError, Result};
pub use events::{
    AnyEvent, Event, EventBase, EventHandle, EventPayload, EventPool, EventTypeId, LifecycleStatus, Propagation,
    PropagationPhase,
};
pub use handler::{
    CallbackHandler, CallbackIdentity, CallbackRegistry, DefaultActions, EventCallback, EventCallbackWithArgs,
    HandlerBuilder, HandlerId, InvokePolicy, ListenerRecord, ListenerTable, TrickleDown,
};
pub use pool::ObjectPool;
