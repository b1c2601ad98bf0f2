//! Handlers, callbacks and callback registries
//!
//! A [`CallbackHandler`] is a node of the event hierarchy. It keeps a weak
//! link to its parent, a lazily created [`CallbackRegistry`], and optional
//! [`DefaultActions`]. Callbacks are registered per payload type and tagged
//! with the half of the propagation they listen to:
//!
//! - [`TrickleDown::TrickleDown`]: trickle-down and at-target
//! - [`TrickleDown::NoTrickleDown`]: at-target and bubble-up

mod callback;
mod listeners;
mod node;
mod registry;

pub use callback::{CallbackIdentity, EventCallback, EventCallbackWithArgs, InvokePolicy, TrickleDown};
pub use listeners::{ListenerRecord, ListenerTable};
pub use node::{CallbackHandler, DefaultActions, HandlerBuilder, HandlerId};
pub use registry::CallbackRegistry;
