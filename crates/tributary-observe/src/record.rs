//! Snapshot of one processed event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tributary_core::{AnyEvent, PropagationPhase};

/// What happened to one event, captured after its default actions ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub event_id: u64,
    /// Id of the event that caused this one, 0 if none
    #[serde(default, skip_serializing_if = "is_zero")]
    pub trigger_event_id: u64,
    /// Rust type name of the payload
    pub event_type: String,
    /// Milliseconds since the process-wide event clock started
    pub timestamp_ms: u64,
    /// Name of the handler the event was sent to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub phase_at_completion: PropagationPhase,
    #[serde(default)]
    pub propagation_stopped: bool,
    #[serde(default)]
    pub default_prevented: bool,
    /// Swallowed by an observer before reaching any handler
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub intercepted: bool,
    pub recorded_at: DateTime<Utc>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl DispatchRecord {
    /// Capture the current state of `evt`
    pub fn capture(evt: &dyn AnyEvent, intercepted: bool) -> Self {
        let base = evt.base();
        Self {
            event_id: base.event_id(),
            trigger_event_id: base.trigger_event_id(),
            event_type: evt.event_type().name().to_string(),
            timestamp_ms: base.timestamp_ms(),
            target: base.leaf_target().map(|target| target.name().to_string()),
            phase_at_completion: base.phase(),
            propagation_stopped: base.is_propagation_stopped(),
            default_prevented: base.is_default_prevented(),
            intercepted,
            recorded_at: Utc::now(),
        }
    }

    /// Last path segment of the payload type name
    pub fn short_type(&self) -> &str {
        self.event_type
            .rsplit("::")
            .next()
            .unwrap_or(&self.event_type)
    }
}
