pub mod catalog;
pub mod config;
pub mod errors;
pub mod intent;
pub mod message;
pub mod observe;
pub mod phase;
pub mod recommendation;
pub mod reference;
pub mod rules;
pub mod session;

pub use catalog::{default_catalog, AsideResponse, ProductCatalog, ProductDefinition, SlotSpec};
pub use config::{
    AgentConfig, ConfigError, ConfigOverrides, EngineConfig, LoadOptions, LogFormat, LoggingConfig,
    RoutingConfig,
};
pub use errors::OrchestrationError;
pub use intent::{FeedbackCategory, FeedbackPrediction, Intent, IntentPrediction};
pub use message::{
    last_turn, last_user_message, recent, recent_tool_error_count, recent_tool_errors, Message,
    Role, ToolStatus, RECENT_WINDOW,
};
pub use observe::{
    EventCategory, EventOutcome, EventSink, InMemoryEventSink, NullEventSink, RoutingEvent,
};
pub use phase::{Phase, PhaseTracker, PHASE_HISTORY_CAP};
pub use recommendation::select_tier;
pub use reference::{extract_reference_context, ReferenceContext};
pub use rules::{
    default_rule_table, validate_slots, ProductRules, Qualitative, RuleTable, SlotRule,
    SlotRuleEntry, ValidationReport,
};
pub use session::{RouteTarget, RoutingDirective, SessionState, StateDelta};
