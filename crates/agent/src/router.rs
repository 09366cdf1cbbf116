use anyhow::Result;
use tracing::{debug, info, warn};

use assure_core::{
    extract_reference_context, AgentConfig, EventCategory, EventOutcome, EventSink,
    FeedbackCategory, FeedbackPrediction, Intent, IntentPrediction, Message, Phase,
    ReferenceContext, RouteTarget, RoutingDirective, RoutingEvent, SessionState, StateDelta,
};

use crate::llm::{AdapterSet, TurnContext};
use crate::policies::{self, EscalationReason, PolicyDecision};

pub const RESET_REPLY: &str = "Sure! Let's start fresh. How can I help you today?";

pub const ESCALATION_REPLY: &str =
    "I understand. Let me connect you with a live agent who can help you further.";

pub const NUDGE_REPLY: &str = "We've covered a lot of ground. Would you like me to put together \
                               a recommendation based on what you've shared so far?";

/// One routing decision for a turn. When `reply` is set the router has
/// already produced the user-facing text and `directive.target` is
/// [`RouteTarget::EndTurn`]; otherwise the named handler produces it.
#[derive(Debug)]
pub struct RouterDecision {
    pub directive: RoutingDirective,
    pub reply: Option<String>,
    pub intent: Intent,
    pub reference: ReferenceContext,
}

/// Priority-ordered guard chain over the conversation. Guards run top
/// to bottom and the first match wins; later guards never observe a
/// partially applied earlier one because deltas are applied by the
/// caller, after routing completes.
pub struct Router<'a> {
    config: &'a AgentConfig,
    adapters: &'a AdapterSet,
    sink: &'a dyn EventSink,
}

impl<'a> Router<'a> {
    pub fn new(config: &'a AgentConfig, adapters: &'a AdapterSet, sink: &'a dyn EventSink) -> Self {
        Self { config, adapters, sink }
    }

    pub async fn route(
        &self,
        messages: &[Message],
        state: &SessionState,
    ) -> Result<RouterDecision> {
        // Guard: nothing to route yet.
        if messages.is_empty() {
            let delta = StateDelta::none();
            return Ok(self.decide(
                state,
                "empty_transcript",
                RoutingDirective::new(delta, RouteTarget::Greeting),
                None,
                Intent::Greet,
                ReferenceContext::default(),
            ));
        }

        // Guard: a switch attempt recorded by the slot engine last turn
        // is rejected before anything is classified.
        if let (Some(attempted), Some(current)) = (&state.pending_switch, &state.product) {
            let display = self.display_name(attempted);
            let current_display = self.display_name(current);
            warn!(%attempted, %current, "product switch rejected");
            let delta = StateDelta::none().with_pending_switch(None);
            return Ok(self.decide(
                state,
                "product_switch_rejected",
                RoutingDirective::new(delta, RouteTarget::EndTurn),
                Some(switch_rejection(&display, &current_display)),
                Intent::Chat,
                ReferenceContext::default(),
            ));
        }

        // Guard: autonomous policies (escalation, self-correction,
        // progress nudge) outrank classification.
        match policies::evaluate(messages, state, &self.config.routing) {
            PolicyDecision::Escalate { reason } => {
                info!(?reason, "routing to escalation");
                let mut delta = StateDelta::none().with_live_agent();
                if reason == EscalationReason::CorrectionCeiling {
                    delta.self_correction_count = Some(state.self_correction_count);
                }
                return Ok(self.decide(
                    state,
                    "escalation",
                    RoutingDirective::new(delta, RouteTarget::Escalation),
                    Some(ESCALATION_REPLY.to_owned()),
                    Intent::Other,
                    ReferenceContext::default(),
                ));
            }
            PolicyDecision::SelfCorrect { guidance } => {
                let delta = StateDelta {
                    self_correction_count: Some(state.self_correction_count + 1),
                    ..StateDelta::none()
                };
                debug!(%guidance, "self-correction nudge");
                return Ok(self.decide(
                    state,
                    "self_correction",
                    RoutingDirective::new(delta, RouteTarget::EndTurn),
                    Some(
                        "I'm having trouble completing that right now. \
                         Let me try a different approach. Could you rephrase or \
                         simplify your last request?"
                            .to_owned(),
                    ),
                    Intent::Other,
                    ReferenceContext::default(),
                ));
            }
            PolicyDecision::NudgeProgress => {
                // Marking the session keeps the nudge from firing again
                // and blocking normal routing.
                let delta = StateDelta { nudged: Some(true), ..StateDelta::none() };
                return Ok(self.decide(
                    state,
                    "progress_nudge",
                    RoutingDirective::new(delta, RouteTarget::EndTurn),
                    Some(NUDGE_REPLY.to_owned()),
                    Intent::Chat,
                    ReferenceContext::default(),
                ));
            }
            PolicyDecision::Continue => {}
        }

        // Guard: mid service flow, short replies (credential fragments,
        // initials) must not be reinterpreted as new top-level intents.
        if state.phase.current() == Phase::ServiceFlow && self.service_flow_active(state) {
            return Ok(self.decide(
                state,
                "service_flow_guard",
                RoutingDirective::new(StateDelta::none(), RouteTarget::ServiceFlow),
                None,
                Intent::PolicyService,
                ReferenceContext::default(),
            ));
        }

        // Scatter-gather: reference resolution and the two classifier
        // calls are independent, so all three run concurrently. The
        // join is a hard barrier before any guard below reads a result.
        let classifier_view = ReferenceContext::default();
        let ctx = TurnContext::new(messages, state, &classifier_view);
        let reference_step =
            async { extract_reference_context(messages, state.product.as_deref(), &state.slots) };
        let (reference, feedback, intent_pred) = tokio::join!(
            reference_step,
            self.adapters.feedback.classify(ctx),
            self.adapters.intent.classify(ctx),
        );
        let feedback = feedback.unwrap_or_else(|error| {
            warn!(%error, "feedback classification failed, assuming no feedback");
            FeedbackPrediction::default()
        });
        let intent_pred = intent_pred.unwrap_or_else(|error| {
            warn!(%error, "intent classification failed, using fallback");
            IntentPrediction::fallback(state.product.as_deref(), messages.len() > 1)
        });
        debug!(intent = intent_pred.intent.as_str(), ?feedback.category, "classification done");

        // Guard: explicit restart clears everything in one delta.
        if intent_pred.reset {
            warn!("session restart requested, clearing state");
            return Ok(self.decide(
                state,
                "session_restart",
                RoutingDirective::new(StateDelta::reset(), RouteTarget::EndTurn),
                Some(RESET_REPLY.to_owned()),
                Intent::Greet,
                reference,
            ));
        }

        // Guard: negative feedback triggers a self-critique rewrite of
        // the previous reply. In slot mode the pending question stays
        // live so the user can still answer it.
        if feedback.category == FeedbackCategory::NegativeFeedback {
            if let Some(previous) = last_assistant(messages) {
                if let Ok(Some(revised)) = self.adapters.feedback.rewrite(ctx, previous).await {
                    info!(slot_mode = state.pending_slot.is_some(), "negative feedback rewrite");
                    let delta = StateDelta {
                        pending_slot: Some(state.pending_slot.clone()),
                        is_slot_reask: Some(state.pending_slot.is_some()),
                        ..StateDelta::none()
                    };
                    return Ok(self.decide(
                        state,
                        "negative_feedback_rewrite",
                        RoutingDirective::new(delta, RouteTarget::EndTurn),
                        Some(revised),
                        intent_pred.intent,
                        reference,
                    ));
                }
            }
        }

        // Guard: a different product surfacing from classification while
        // one is sticky is a switch attempt, rejected the same way.
        if let (Some(detected), Some(current)) = (&intent_pred.product, &state.product) {
            if !detected.eq_ignore_ascii_case(current)
                && self.config.catalog.resolve(detected).is_some()
            {
                let display = self.display_name(detected);
                let current_display = self.display_name(current);
                warn!(%detected, %current, "product switch from intent blocked");
                let delta = StateDelta {
                    product: Some(Some(current.clone())),
                    ..StateDelta::none()
                };
                return Ok(self.decide(
                    state,
                    "product_switch_from_intent",
                    RoutingDirective::new(delta, RouteTarget::EndTurn),
                    Some(switch_rejection(&display, &current_display)),
                    intent_pred.intent,
                    reference,
                ));
            }
        }

        // Guard: with a question pending and no recommendation yet, stay
        // in the collection flow. The slot engine sorts out whether the
        // message is an answer, a side question, or something else.
        if state.pending_slot.is_some() && !state.rec_given && state.product.is_some() {
            if policies::looks_like_slot_answer(messages) {
                debug!("short reply to a pending question");
            }
            let delta = StateDelta::none();
            return Ok(self.decide(
                state,
                "pending_slot",
                RoutingDirective::new(delta, RouteTarget::SlotEngine),
                None,
                Intent::Recommend,
                reference,
            ));
        }

        // Normal path: the classified intent picks the handler. The
        // phase is settled by the runtime, from this same intent.
        let intent = intent_pred.intent;
        let product = intent_pred.product.clone().or_else(|| state.product.clone());
        let target = self.target_for(intent, state);

        let mut delta = StateDelta::none();
        if intent == Intent::Greet {
            // A greeting starts the conversation over.
            delta.reset = true;
        } else if let Some(product) = &product {
            delta.product = Some(Some(product.clone()));
        }

        debug!(intent = intent.as_str(), target = target.as_str(), "routed");
        Ok(self.decide(
            state,
            "intent",
            RoutingDirective::new(delta, target),
            None,
            intent,
            reference,
        ))
    }

    fn target_for(&self, intent: Intent, state: &SessionState) -> RouteTarget {
        match intent {
            Intent::Info | Intent::Summary | Intent::Capabilities | Intent::Chat | Intent::Other => {
                RouteTarget::InfoQuery
            }
            Intent::Compare => RouteTarget::Comparison,
            Intent::Recommend => {
                if state.rec_given {
                    RouteTarget::Recommendation
                } else {
                    RouteTarget::SlotEngine
                }
            }
            Intent::Purchase => RouteTarget::Purchase,
            Intent::Greet => RouteTarget::Greeting,
            Intent::PolicyService => RouteTarget::ServiceFlow,
        }
    }

    fn service_flow_active(&self, state: &SessionState) -> bool {
        !state.customer_validated
            || state.service_pending_slot.is_some()
            || state.service_action.is_some()
    }

    fn display_name(&self, product: &str) -> String {
        self.config
            .catalog
            .resolve(product)
            .and_then(|key| self.config.catalog.get(&key))
            .map(|definition| definition.name.clone())
            .unwrap_or_else(|| product.to_owned())
    }

    fn decide(
        &self,
        state: &SessionState,
        guard: &str,
        directive: RoutingDirective,
        reply: Option<String>,
        intent: Intent,
        reference: ReferenceContext,
    ) -> RouterDecision {
        self.sink.emit(
            RoutingEvent::new(
                state.session_id,
                state.turn_count,
                format!("router.{guard}"),
                EventCategory::Routing,
                EventOutcome::Success,
            )
            .with_target(directive.target)
            .with_metadata("intent", intent.as_str()),
        );
        RouterDecision { directive, reply, intent, reference }
    }
}

fn last_assistant(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|message| message.role == assure_core::Role::Assistant)
        .map(|message| message.content.as_str())
}

fn switch_rejection(attempted: &str, current: &str) -> String {
    format!(
        "I'm sorry, but I cannot switch to {attempted} insurance during our current \
         conversation. To explore {attempted} insurance, please say 'Restart Session' or \
         'Start Over' to begin fresh. For now, let's continue with {current} insurance. \
         Would you like to proceed with {current}?"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::Result;
    use async_trait::async_trait;

    use assure_core::{
        AgentConfig, FeedbackCategory, FeedbackPrediction, InMemoryEventSink, Intent,
        IntentPrediction, Message, Phase, ProductDefinition, RouteTarget, SessionState,
    };

    use super::{Router, NUDGE_REPLY, RESET_REPLY};
    use crate::llm::{
        AdapterSet, FeedbackClassifier, InfoLookup, IntentClassifier, ProductDetector,
        QuestionWriter, RecommendationWriter, SlotExtraction, SlotExtractor, TurnContext,
    };

    struct FixedIntent(IntentPrediction);

    #[async_trait]
    impl IntentClassifier for FixedIntent {
        async fn classify(&self, _ctx: TurnContext<'_>) -> Result<IntentPrediction> {
            Ok(self.0.clone())
        }
    }

    struct FixedFeedback {
        prediction: FeedbackPrediction,
        rewrite: Option<String>,
    }

    #[async_trait]
    impl FeedbackClassifier for FixedFeedback {
        async fn classify(&self, _ctx: TurnContext<'_>) -> Result<FeedbackPrediction> {
            Ok(self.prediction.clone())
        }

        async fn rewrite(
            &self,
            _ctx: TurnContext<'_>,
            _previous_reply: &str,
        ) -> Result<Option<String>> {
            Ok(self.rewrite.clone())
        }
    }

    struct NoopExtractor;

    #[async_trait]
    impl SlotExtractor for NoopExtractor {
        async fn extract(
            &self,
            _ctx: TurnContext<'_>,
            _product: &ProductDefinition,
        ) -> Result<SlotExtraction> {
            Ok(SlotExtraction::default())
        }
    }

    struct NoopLookup;

    #[async_trait]
    impl InfoLookup for NoopLookup {
        async fn lookup(&self, _ctx: TurnContext<'_>, _question: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    struct NoopDetector;

    #[async_trait]
    impl ProductDetector for NoopDetector {
        async fn detect(&self, _ctx: TurnContext<'_>) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct NoopQuestion;

    #[async_trait]
    impl QuestionWriter for NoopQuestion {
        async fn write_question(
            &self,
            _ctx: TurnContext<'_>,
            _product: &ProductDefinition,
            _slot: &str,
            _description: &str,
        ) -> Result<String> {
            Ok("question".to_owned())
        }
    }

    struct NoopRecommendation;

    #[async_trait]
    impl RecommendationWriter for NoopRecommendation {
        async fn write_recommendation(
            &self,
            _ctx: TurnContext<'_>,
            _product: &ProductDefinition,
            _tier: Option<&str>,
            _slots: &BTreeMap<String, String>,
        ) -> Result<String> {
            Ok("recommendation".to_owned())
        }
    }

    fn adapters(intent: IntentPrediction, feedback: FeedbackPrediction) -> AdapterSet {
        AdapterSet {
            intent: Box::new(FixedIntent(intent)),
            feedback: Box::new(FixedFeedback { prediction: feedback, rewrite: None }),
            slot_extractor: Box::new(NoopExtractor),
            info_lookup: Box::new(NoopLookup),
            product_detector: Box::new(NoopDetector),
            question_writer: Box::new(NoopQuestion),
            recommendation_writer: Box::new(NoopRecommendation),
        }
    }

    fn intent_only(intent: Intent) -> IntentPrediction {
        IntentPrediction { intent, product: None, reset: false, reason: String::new() }
    }

    #[tokio::test]
    async fn reset_intent_clears_state_and_replies() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let prediction = IntentPrediction {
            intent: Intent::Greet,
            product: None,
            reset: true,
            reason: "restart".to_owned(),
        };
        let set = adapters(prediction, FeedbackPrediction::default());
        let router = Router::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.slots.insert("destination".to_owned(), "Japan".to_owned());
        let messages = vec![Message::user("restart session")];

        let decision = router.route(&messages, &state).await.expect("route");
        assert!(decision.directive.delta.reset);
        assert_eq!(decision.reply.as_deref(), Some(RESET_REPLY));
        assert_eq!(decision.directive.target, RouteTarget::EndTurn);
    }

    #[tokio::test]
    async fn product_switch_from_intent_is_rejected() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let prediction = IntentPrediction {
            intent: Intent::Recommend,
            product: Some("car".to_owned()),
            reset: false,
            reason: String::new(),
        };
        let set = adapters(prediction, FeedbackPrediction::default());
        let router = Router::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        let messages = vec![Message::user("actually I want car insurance")];

        let decision = router.route(&messages, &state).await.expect("route");
        let reply = decision.reply.expect("rejection reply");
        assert!(reply.contains("Car"));
        assert!(reply.contains("Restart Session"));
        assert_eq!(decision.directive.delta.product, Some(Some("travel".to_owned())));
        assert_eq!(decision.directive.target, RouteTarget::EndTurn);
    }

    #[tokio::test]
    async fn pending_slot_routes_to_slot_engine() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set =
            adapters(intent_only(Intent::Chat), FeedbackPrediction::default());
        let router = Router::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.pending_slot = Some("destination".to_owned());
        let messages = vec![
            Message::assistant("Where are you travelling to?"),
            Message::user("Japan"),
        ];

        let decision = router.route(&messages, &state).await.expect("route");
        assert_eq!(decision.directive.target, RouteTarget::SlotEngine);
        assert!(decision.reply.is_none());
    }

    #[tokio::test]
    async fn escalation_keyword_outranks_pending_slot() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(intent_only(Intent::Chat), FeedbackPrediction::default());
        let router = Router::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.pending_slot = Some("destination".to_owned());
        let messages = vec![
            Message::assistant("Where are you travelling to?"),
            Message::user("forget this, I want to talk to a person"),
        ];

        let decision = router.route(&messages, &state).await.expect("route");
        assert_eq!(decision.directive.target, RouteTarget::Escalation);
        assert_eq!(decision.directive.delta.live_agent_requested, Some(true));
    }

    #[tokio::test]
    async fn negative_feedback_reasks_with_slot_kept() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let prediction = intent_only(Intent::Recommend);
        let feedback = FeedbackPrediction {
            category: FeedbackCategory::NegativeFeedback,
            reason: "confusing".to_owned(),
        };
        let mut set = adapters(prediction, feedback.clone());
        set.feedback = Box::new(FixedFeedback {
            prediction: feedback,
            rewrite: Some("Let me put that more clearly. Who is the coverage for?".to_owned()),
        });
        let router = Router::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.pending_slot = Some("coverage_scope".to_owned());
        let messages = vec![
            Message::assistant("Who should the plan cover?"),
            Message::user("that makes no sense"),
        ];

        let decision = router.route(&messages, &state).await.expect("route");
        assert!(decision.reply.expect("rewrite").contains("more clearly"));
        assert_eq!(
            decision.directive.delta.pending_slot,
            Some(Some("coverage_scope".to_owned()))
        );
        assert_eq!(decision.directive.delta.is_slot_reask, Some(true));
    }

    #[tokio::test]
    async fn service_flow_guard_holds_short_replies() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(intent_only(Intent::Other), FeedbackPrediction::default());
        let router = Router::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.phase.transition(Phase::ServiceFlow);
        state.customer_validated = false;
        let messages = vec![
            Message::assistant("Please share the last four characters of your ID."),
            Message::user("123A"),
        ];

        let decision = router.route(&messages, &state).await.expect("route");
        assert_eq!(decision.directive.target, RouteTarget::ServiceFlow);
        assert_eq!(decision.intent, Intent::PolicyService);
    }

    #[tokio::test]
    async fn greeting_starts_over() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(intent_only(Intent::Greet), FeedbackPrediction::default());
        let router = Router::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = None;
        let messages = vec![Message::user("hello there")];

        let decision = router.route(&messages, &state).await.expect("route");
        assert_eq!(decision.directive.target, RouteTarget::Greeting);
        assert!(decision.directive.delta.reset);
    }

    #[tokio::test]
    async fn reference_is_resolved_alongside_classification() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(intent_only(Intent::Recommend), FeedbackPrediction::default());
        let router = Router::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        let messages = vec![
            Message::assistant("Who will be covered by the plan?"),
            Message::user("just me"),
        ];

        let decision = router.route(&messages, &state).await.expect("route");
        let question = decision.reference.last_bot_question.expect("bot question");
        assert!(question.contains("Who will be covered"));
    }

    #[tokio::test]
    async fn progress_nudge_marks_session_and_yields_next_turn() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(intent_only(Intent::Recommend), FeedbackPrediction::default());
        let router = Router::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.turn_count = 21;
        let messages = vec![Message::user("please recommend travel insurance")];

        let decision = router.route(&messages, &state).await.expect("route");
        assert_eq!(decision.reply.as_deref(), Some(NUDGE_REPLY));
        assert_eq!(decision.directive.delta.nudged, Some(true));

        // With the mark applied, the same message routes normally.
        state.apply(&decision.directive.delta);
        let decision = router.route(&messages, &state).await.expect("route");
        assert_eq!(decision.directive.target, RouteTarget::SlotEngine);
        assert!(decision.reply.is_none());
    }

    #[tokio::test]
    async fn routing_emits_audit_events() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(intent_only(Intent::Info), FeedbackPrediction::default());
        let router = Router::new(&config, &set, &sink);

        let state = SessionState::new();
        let messages = vec![Message::user("what does travel insurance cover?")];
        let decision = router.route(&messages, &state).await.expect("route");
        assert_eq!(decision.directive.target, RouteTarget::InfoQuery);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "router.intent");
        assert_eq!(events[0].target, Some(RouteTarget::InfoQuery));
    }
}
