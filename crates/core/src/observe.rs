use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::RouteTarget;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCategory {
    Routing,
    SlotEngine,
    Policy,
    Adapter,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOutcome {
    Success,
    Rejected,
    Failed,
}

/// One record in the routing audit trail: which guard or stage fired,
/// where the turn went, and why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEvent {
    pub event_id: String,
    pub session_id: Uuid,
    pub turn: u32,
    pub event_type: String,
    pub category: EventCategory,
    pub target: Option<RouteTarget>,
    pub outcome: EventOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl RoutingEvent {
    pub fn new(
        session_id: Uuid,
        turn: u32,
        event_type: impl Into<String>,
        category: EventCategory,
        outcome: EventOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            session_id,
            turn,
            event_type: event_type.into(),
            category,
            target: None,
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_target(mut self, target: RouteTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RoutingEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<RoutingEvent>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<RoutingEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: RoutingEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Sink that drops everything. Used when callers do not care about the
/// audit trail.
#[derive(Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: RoutingEvent) {}
}
