//! Payloads, callbacks and default actions shared by the integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use tributary_core::{AnyEvent, CallbackResult, DefaultActions, EventCallback, EventPayload, Propagation};

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

/// Bubbles, trickles down and can be cancelled
#[derive(Debug, Default)]
pub struct Clicked;

impl EventPayload for Clicked {
    fn propagation() -> Propagation {
        Propagation::BUBBLES | Propagation::TRICKLES_DOWN | Propagation::CANCELLABLE
    }
}

/// Bubbles only
#[derive(Debug, Default)]
pub struct Changed;

impl EventPayload for Changed {
    fn propagation() -> Propagation {
        Propagation::BUBBLES
    }
}

/// Neither bubbles nor trickles down
#[derive(Debug, Default)]
pub struct Direct;

impl EventPayload for Direct {}

/// Bubbles and skips disabled handlers
#[derive(Debug, Default)]
pub struct Guarded;

impl EventPayload for Guarded {
    fn propagation() -> Propagation {
        Propagation::BUBBLES | Propagation::SKIP_DISABLED
    }
}

/// Numbered job used for ordering checks
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Job(pub u32);

impl EventPayload for Job {}

/// Callback that appends `label:Phase`
pub fn record<P: EventPayload>(log: &Log, label: &'static str) -> EventCallback<P> {
    let log = Rc::clone(log);
    EventCallback::new(move |evt| {
        log.borrow_mut().push(format!("{label}:{:?}", evt.phase()));
        Ok(())
    })
}

/// Default actions that append `label:<hook>`
pub struct Actions {
    pub label: &'static str,
    pub log: Log,
}

impl Actions {
    pub fn new(label: &'static str, log: &Log) -> Rc<Self> {
        Rc::new(Self {
            label,
            log: Rc::clone(log),
        })
    }

    fn push(&self, hook: &str) -> CallbackResult {
        self.log.borrow_mut().push(format!("{}:{hook}", self.label));
        Ok(())
    }
}

impl DefaultActions for Actions {
    fn execute_default_action_at_target(&self, _evt: &mut dyn AnyEvent) -> CallbackResult {
        self.push("default_at_target")
    }

    fn execute_default_action(&self, _evt: &mut dyn AnyEvent) -> CallbackResult {
        self.push("default")
    }

    fn execute_default_action_disabled_at_target(&self, _evt: &mut dyn AnyEvent) -> CallbackResult {
        self.push("disabled_at_target")
    }

    fn execute_default_action_disabled(&self, _evt: &mut dyn AnyEvent) -> CallbackResult {
        self.push("disabled")
    }
}
