//! Path building, phase propagation, strategies and the dispatcher

mod dispatcher;
mod path;
mod propagate;
mod strategy;

pub use dispatcher::{DispatchMode, DispatcherGate, EventDispatcher};
pub use path::{PathPool, PropagationPath};
pub use propagate::{execute_default_action, propagate_event};
pub use strategy::{DefaultDispatchingStrategy, DispatchingStrategy};
