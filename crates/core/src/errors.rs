use thiserror::Error;

/// Failures the orchestrator can recover from within the conversation.
/// Each carries enough context for the router to pick a degraded path
/// instead of surfacing a raw error to the user.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("classification failure for stage {stage}: {detail}")]
    ClassificationFailure { stage: String, detail: String },
    #[error("validation failure for slot {slot}: {detail}")]
    ValidationFailure { slot: String, detail: String },
    #[error("tool {tool} failed {count} times in the recent window")]
    RepeatedToolFailure { tool: String, count: usize },
    #[error("product switch from {active} to {attempted} without reset")]
    ProductSwitchViolation { active: String, attempted: String },
    #[error("unrecoverable state corruption: {0}")]
    UnrecoverableStateCorruption(String),
}

impl OrchestrationError {
    /// Errors the router can absorb by falling back (re-ask, nudge,
    /// default classification). Corruption forces escalation.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::UnrecoverableStateCorruption(_))
    }

    /// What the user sees when the error reaches them at all. Internal
    /// detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ClassificationFailure { .. } => {
                "I didn't quite catch that. Could you rephrase your request?"
            }
            Self::ValidationFailure { .. } => {
                "That answer didn't look right. Let me ask again."
            }
            Self::RepeatedToolFailure { .. } => {
                "I'm having trouble completing that right now. Let me try a different approach."
            }
            Self::ProductSwitchViolation { .. } => {
                "We're in the middle of another product. Please restart the session to switch."
            }
            Self::UnrecoverableStateCorruption(_) => {
                "Something went wrong on my side. Let me connect you with a live agent."
            }
        }
    }
}
