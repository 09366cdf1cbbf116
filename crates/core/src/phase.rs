use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::intent::Intent;

/// Maximum number of retained phase-history entries.
pub const PHASE_HISTORY_CAP: usize = 20;

/// The single discrete stage of the conversation state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Greeting,
    ProductSelection,
    SlotFilling,
    Recommendation,
    Comparison,
    Purchase,
    InfoQuery,
    Closing,
    Escalation,
    ServiceFlow,
}

impl Phase {
    /// Deterministic, side-effect-free mapping from intent and state flags.
    ///
    /// `live_agent_requested` overrides every other derivation.
    pub fn derive(
        intent: Intent,
        has_product: bool,
        rec_given: bool,
        _purchase_offered: bool,
        live_agent_requested: bool,
    ) -> Self {
        if live_agent_requested {
            return Phase::Escalation;
        }
        match intent {
            Intent::Greet => Phase::Greeting,
            Intent::Purchase => Phase::Purchase,
            Intent::Compare => Phase::Comparison,
            Intent::Info | Intent::Summary | Intent::Capabilities | Intent::Other => {
                Phase::InfoQuery
            }
            Intent::PolicyService => Phase::ServiceFlow,
            Intent::Recommend => {
                if rec_given {
                    Phase::Recommendation
                } else if has_product {
                    Phase::SlotFilling
                } else {
                    Phase::ProductSelection
                }
            }
            Intent::Chat => {
                if has_product {
                    Phase::SlotFilling
                } else {
                    Phase::ProductSelection
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Greeting => "greeting",
            Phase::ProductSelection => "product_selection",
            Phase::SlotFilling => "slot_filling",
            Phase::Recommendation => "recommendation",
            Phase::Comparison => "comparison",
            Phase::Purchase => "purchase",
            Phase::InfoQuery => "info_query",
            Phase::Closing => "closing",
            Phase::Escalation => "escalation",
            Phase::ServiceFlow => "service_flow",
        }
    }
}

/// Current phase plus a bounded, append-only transition history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTracker {
    current: Phase,
    history: Vec<Phase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self { current: Phase::Greeting, history: vec![Phase::Greeting] }
    }
}

impl PhaseTracker {
    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Record a transition; the oldest entries are trimmed past the cap.
    pub fn transition(&mut self, next: Phase) {
        if next != self.current {
            debug!(from = self.current.as_str(), to = next.as_str(), "phase transition");
        }
        self.current = next;
        self.history.push(next);
        if self.history.len() > PHASE_HISTORY_CAP {
            let excess = self.history.len() - PHASE_HISTORY_CAP;
            self.history.drain(..excess);
        }
    }

    /// Drop history and restart at Greeting, as after an explicit reset.
    pub fn reset(&mut self) {
        self.current = Phase::Greeting;
        self.history = vec![Phase::Greeting];
    }
}
