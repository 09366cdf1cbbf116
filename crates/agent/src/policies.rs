use tracing::{debug, info, warn};

use assure_core::message::{last_turn, recent, recent_tool_error_count, recent_tool_errors};
use assure_core::{Message, Role, RoutingConfig, SessionState};

/// Assistant phrase that marks a handoff already announced to the user.
const HANDOFF_MARKER: &str = "connect you with a live agent";

/// How many trailing messages the live-agent scan looks at.
const HANDOFF_SCAN_WINDOW: usize = 5;

/// What the autonomous policies decided before normal routing runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    /// No policy fired; continue with normal routing.
    Continue,
    /// Hand the conversation to a live agent.
    Escalate { reason: EscalationReason },
    /// Inject corrective guidance and retry with a different approach.
    SelfCorrect { guidance: String },
    /// Conversation has run long without a recommendation; nudge the
    /// user back toward a concrete goal. Delivered at most once per
    /// session so routing is never blocked by it.
    NudgeProgress,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationReason {
    UserRequested,
    AlreadyAnnounced,
    CorrectionCeiling,
}

/// Policy evaluation is pure: same messages and state always produce
/// the same decision, so running it twice in a turn is harmless.
pub fn evaluate(
    messages: &[Message],
    state: &SessionState,
    config: &RoutingConfig,
) -> PolicyDecision {
    // Escalation outranks everything else.
    if state.live_agent_requested {
        return PolicyDecision::Escalate { reason: EscalationReason::AlreadyAnnounced };
    }
    if let Some(reason) = detect_escalation(messages, config) {
        info!(?reason, "live agent handoff requested");
        return PolicyDecision::Escalate { reason };
    }

    if state.self_correction_count >= config.max_self_corrections {
        warn!(
            count = state.self_correction_count,
            "self-correction ceiling reached, escalating"
        );
        return PolicyDecision::Escalate { reason: EscalationReason::CorrectionCeiling };
    }

    let error_count = recent_tool_error_count(messages);
    if error_count >= config.tool_error_threshold {
        warn!(error_count, "repeated tool errors, triggering self-correction");
        return PolicyDecision::SelfCorrect { guidance: corrective_guidance(messages) };
    }

    if state.turn_count > 20 && !state.rec_given && !state.nudged {
        debug!(turn = state.turn_count, "long conversation without progress");
        return PolicyDecision::NudgeProgress;
    }

    PolicyDecision::Continue
}

/// A handoff fires when the user asks for a person, or when a previous
/// reply already promised one.
fn detect_escalation(messages: &[Message], config: &RoutingConfig) -> Option<EscalationReason> {
    for message in recent(messages, HANDOFF_SCAN_WINDOW).iter().rev() {
        let content = message.content.to_ascii_lowercase();
        match message.role {
            Role::Assistant if content.contains(HANDOFF_MARKER) => {
                return Some(EscalationReason::AlreadyAnnounced);
            }
            Role::User => {
                if config.escalation_keywords.iter().any(|keyword| content.contains(keyword)) {
                    return Some(EscalationReason::UserRequested);
                }
            }
            _ => {}
        }
    }
    None
}

/// Summarizes the last few tool failures into guidance the runtime
/// injects before retrying. The failing calls themselves are never
/// repeated verbatim.
fn corrective_guidance(messages: &[Message]) -> String {
    let errors = recent_tool_errors(messages);
    if errors.is_empty() {
        return "The previous approach didn't work well. \
                Try a different strategy or ask the user for clarification."
            .to_owned();
    }

    let summary = errors
        .iter()
        .map(|(tool, content)| format!("- {tool}: {content}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Recent tool errors:\n{summary}\n\n\
         Try a different approach: check input formats, simplify the query, \
         or ask the user for clarification. Do not repeat the failing call."
    )
}

/// Rough signal that the user replied to the pending question rather
/// than opening a new topic. Used only as a logging hint; routing
/// relies on classification.
pub fn looks_like_slot_answer(messages: &[Message]) -> bool {
    let Some((assistant, user)) = last_turn(messages) else { return false };
    assistant.content.contains('?') && user.content.split_whitespace().count() <= 6
}
