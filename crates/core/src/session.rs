use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::phase::PhaseTracker;

/// Where the router sends the turn after its guards have run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Greeting,
    ProductSelection,
    SlotEngine,
    Recommendation,
    Comparison,
    Purchase,
    InfoQuery,
    ServiceFlow,
    Escalation,
    EndTurn,
}

impl RouteTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteTarget::Greeting => "greeting",
            RouteTarget::ProductSelection => "product_selection",
            RouteTarget::SlotEngine => "slot_engine",
            RouteTarget::Recommendation => "recommendation",
            RouteTarget::Comparison => "comparison",
            RouteTarget::Purchase => "purchase",
            RouteTarget::InfoQuery => "info_query",
            RouteTarget::ServiceFlow => "service_flow",
            RouteTarget::Escalation => "escalation",
            RouteTarget::EndTurn => "end_turn",
        }
    }
}

/// Declarative state update. Fields left as `None` are untouched;
/// `Some(None)` on a nullable field clears it. A delta is applied in
/// one step so a turn never observes a half-written session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub product: Option<Option<String>>,
    pub slots: Option<BTreeMap<String, String>>,
    pub pending_slot: Option<Option<String>>,
    pub pending_switch: Option<Option<String>>,
    pub slot_guidance: Option<BTreeMap<String, String>>,
    pub is_slot_reask: Option<bool>,
    pub side_info: Option<Option<String>>,
    pub rec_ready: Option<bool>,
    pub rec_given: Option<bool>,
    pub purchase_offered: Option<bool>,
    pub live_agent_requested: Option<bool>,
    pub nudged: Option<bool>,
    pub self_correction_count: Option<u32>,
    pub customer_validated: Option<bool>,
    pub service_action: Option<Option<String>>,
    pub service_pending_slot: Option<Option<String>>,
    pub service_slots: Option<BTreeMap<String, String>>,
    pub summary: Option<Option<String>>,
    pub reset: bool,
}

impl StateDelta {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn reset() -> Self {
        Self { reset: true, ..Self::default() }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(Some(product.into()));
        self
    }

    pub fn clear_product(mut self) -> Self {
        self.product = Some(None);
        self
    }

    pub fn with_slots(mut self, slots: BTreeMap<String, String>) -> Self {
        self.slots = Some(slots);
        self
    }

    pub fn with_pending_slot(mut self, slot: Option<String>) -> Self {
        self.pending_slot = Some(slot);
        self
    }

    pub fn with_pending_switch(mut self, product: Option<String>) -> Self {
        self.pending_switch = Some(product);
        self
    }

    pub fn with_live_agent(mut self) -> Self {
        self.live_agent_requested = Some(true);
        self
    }
}

/// Per-conversation state owned by the orchestrator. All mutation goes
/// through [`SessionState::apply`] or the explicit clear methods.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub phase: PhaseTracker,
    /// Sticky product focus for the whole session.
    pub product: Option<String>,
    pub slots: BTreeMap<String, String>,
    /// Slot the last bot question asked about.
    pub pending_slot: Option<String>,
    /// Product the user tried to switch to, held across the turn so the
    /// rejection is only sent once.
    pub pending_switch: Option<String>,
    /// Stored re-ask guidance per slot, reused verbatim.
    pub slot_guidance: BTreeMap<String, String>,
    pub is_slot_reask: bool,
    /// Answer to an off-path side question, prepended to the next ask.
    pub side_info: Option<String>,
    pub rec_ready: bool,
    pub rec_given: bool,
    pub purchase_offered: bool,
    pub live_agent_requested: bool,
    /// The long-conversation nudge is delivered at most once.
    pub nudged: bool,
    pub turn_count: u32,
    pub self_correction_count: u32,
    pub customer_validated: bool,
    pub service_action: Option<String>,
    pub service_pending_slot: Option<String>,
    pub service_slots: BTreeMap<String, String>,
    pub summary: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            phase: PhaseTracker::default(),
            product: None,
            slots: BTreeMap::new(),
            pending_slot: None,
            pending_switch: None,
            slot_guidance: BTreeMap::new(),
            is_slot_reask: false,
            side_info: None,
            rec_ready: false,
            rec_given: false,
            purchase_offered: false,
            live_agent_requested: false,
            nudged: false,
            turn_count: 0,
            self_correction_count: 0,
            customer_validated: false,
            service_action: None,
            service_pending_slot: None,
            service_slots: BTreeMap::new(),
            summary: None,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// All required slots for the current product present and valid.
    pub fn missing_slots<'a>(&self, required: &'a [String]) -> Vec<&'a String> {
        required.iter().filter(|slot| !self.slots.contains_key(slot.as_str())).collect()
    }

    /// Applies a delta atomically. A `reset` delta clears conversation
    /// state before the remaining fields land, so a single directive can
    /// reset and seed a new product in one step.
    pub fn apply(&mut self, delta: &StateDelta) {
        if delta.reset {
            self.clear_conversation();
        }
        if let Some(product) = &delta.product {
            self.product = product.clone();
        }
        if let Some(slots) = &delta.slots {
            self.slots = slots.clone();
        }
        if let Some(pending) = &delta.pending_slot {
            self.pending_slot = pending.clone();
        }
        if let Some(switch) = &delta.pending_switch {
            self.pending_switch = switch.clone();
        }
        if let Some(guidance) = &delta.slot_guidance {
            self.slot_guidance = guidance.clone();
        }
        if let Some(reask) = delta.is_slot_reask {
            self.is_slot_reask = reask;
        }
        if let Some(side) = &delta.side_info {
            self.side_info = side.clone();
        }
        if let Some(ready) = delta.rec_ready {
            self.rec_ready = ready;
        }
        if let Some(given) = delta.rec_given {
            self.rec_given = given;
        }
        if let Some(offered) = delta.purchase_offered {
            self.purchase_offered = offered;
        }
        if let Some(live) = delta.live_agent_requested {
            self.live_agent_requested = live;
        }
        if let Some(nudged) = delta.nudged {
            self.nudged = nudged;
        }
        if let Some(count) = delta.self_correction_count {
            self.self_correction_count = count;
        }
        if let Some(validated) = delta.customer_validated {
            self.customer_validated = validated;
        }
        if let Some(action) = &delta.service_action {
            self.service_action = action.clone();
        }
        if let Some(pending) = &delta.service_pending_slot {
            self.service_pending_slot = pending.clone();
        }
        if let Some(slots) = &delta.service_slots {
            self.service_slots = slots.clone();
        }
        if let Some(summary) = &delta.summary {
            self.summary = summary.clone();
        }
    }

    /// Wipes conversation progress while keeping identity, phase
    /// history, and turn counters. Used for explicit resets and for
    /// greetings, which start the conversation over.
    pub fn clear_conversation(&mut self) {
        debug!(session = %self.session_id, "clearing conversation state");
        self.product = None;
        self.slots.clear();
        self.pending_slot = None;
        self.pending_switch = None;
        self.slot_guidance.clear();
        self.is_slot_reask = false;
        self.side_info = None;
        self.rec_ready = false;
        self.rec_given = false;
        self.purchase_offered = false;
        self.nudged = false;
        self.self_correction_count = 0;
        self.customer_validated = false;
        self.service_action = None;
        self.service_pending_slot = None;
        self.service_slots.clear();
        self.summary = None;
    }

    /// Product switch after reset: collection progress goes, the new
    /// product becomes the sticky focus.
    pub fn switch_product(&mut self, product: impl Into<String>) {
        self.slots.clear();
        self.pending_slot = None;
        self.pending_switch = None;
        self.slot_guidance.clear();
        self.is_slot_reask = false;
        self.side_info = None;
        self.rec_ready = false;
        self.rec_given = false;
        self.purchase_offered = false;
        self.product = Some(product.into());
    }
}

/// One routing decision: the state update and where control goes next,
/// applied together.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingDirective {
    pub delta: StateDelta,
    pub target: RouteTarget,
}

impl RoutingDirective {
    pub fn new(delta: StateDelta, target: RouteTarget) -> Self {
        Self { delta, target }
    }

    pub fn goto(target: RouteTarget) -> Self {
        Self { delta: StateDelta::none(), target }
    }
}

#[cfg(test)]
mod tests {
    use super::{RouteTarget, RoutingDirective, SessionState, StateDelta};

    #[test]
    fn delta_none_fields_leave_state_untouched() {
        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.slots.insert("destination".to_owned(), "Japan".to_owned());

        state.apply(&StateDelta::none().with_pending_slot(Some("coverage_scope".to_owned())));

        assert_eq!(state.product.as_deref(), Some("travel"));
        assert_eq!(state.slots.get("destination").map(String::as_str), Some("Japan"));
        assert_eq!(state.pending_slot.as_deref(), Some("coverage_scope"));
    }

    #[test]
    fn reset_delta_clears_then_seeds_in_one_apply() {
        let mut state = SessionState::new();
        state.product = Some("maid".to_owned());
        state.slots.insert("maid_country".to_owned(), "Philippines".to_owned());
        state.rec_given = true;

        state.apply(&StateDelta::reset().with_product("travel"));

        assert_eq!(state.product.as_deref(), Some("travel"));
        assert!(state.slots.is_empty());
        assert!(!state.rec_given);
    }

    #[test]
    fn switch_product_drops_collection_progress() {
        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.slots.insert("destination".to_owned(), "Japan".to_owned());
        state.pending_slot = Some("coverage_scope".to_owned());
        state.slot_guidance.insert("coverage_scope".to_owned(), "pick one".to_owned());
        state.rec_ready = true;
        state.turn_count = 4;

        state.switch_product("home");

        assert_eq!(state.product.as_deref(), Some("home"));
        assert!(state.slots.is_empty());
        assert!(state.pending_slot.is_none());
        assert!(state.slot_guidance.is_empty());
        assert!(!state.rec_ready);
        assert_eq!(state.turn_count, 4);
    }

    #[test]
    fn missing_slots_respects_present_keys() {
        let mut state = SessionState::new();
        state.slots.insert("coverage_scope".to_owned(), "self".to_owned());
        let required = vec!["coverage_scope".to_owned(), "destination".to_owned()];

        let missing = state.missing_slots(&required);
        assert_eq!(missing, vec![&"destination".to_owned()]);
    }

    #[test]
    fn directive_goto_carries_empty_delta() {
        let directive = RoutingDirective::goto(RouteTarget::Escalation);
        assert_eq!(directive.delta, StateDelta::none());
        assert_eq!(directive.target, RouteTarget::Escalation);

        let mut state = SessionState::new();
        let before = state.slots.clone();
        state.apply(&directive.delta);
        assert_eq!(state.slots, before);
    }
}
