use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, info, warn};

use assure_core::rules::SlotRule;
use assure_core::{
    select_tier, validate_slots, AgentConfig, EventCategory, EventOutcome, EventSink, Message,
    OrchestrationError, ProductDefinition, ReferenceContext, RoutingEvent, SessionState,
    StateDelta,
};

use crate::llm::{AdapterSet, SlotExtraction, TurnContext};

/// Marker slot an extractor records when the user declines to continue
/// the interview. A value of `yes` closes the collection flow.
pub const DECLINE_SLOT: &str = "flow_declined";

/// What the collection engine produced for this turn. `reply` is absent
/// only when the engine bailed out for the router to handle (a switch
/// attempt recorded in `delta.pending_switch`).
#[derive(Debug)]
pub struct EngineOutcome {
    pub delta: StateDelta,
    pub reply: Option<String>,
}

/// Staged slot-collection engine: ensure product, extract, then
/// validate and side-info lookup concurrently, then resolve into the
/// next question or the recommendation. Each stage only reads state
/// and writes to the accumulating delta.
pub struct SlotEngine<'a> {
    config: &'a AgentConfig,
    adapters: &'a AdapterSet,
    sink: &'a dyn EventSink,
}

impl<'a> SlotEngine<'a> {
    pub fn new(config: &'a AgentConfig, adapters: &'a AdapterSet, sink: &'a dyn EventSink) -> Self {
        Self { config, adapters, sink }
    }

    pub async fn run(
        &self,
        messages: &[Message],
        state: &SessionState,
        reference: &ReferenceContext,
    ) -> Result<EngineOutcome> {
        let ctx = TurnContext::new(messages, state, reference);

        // Stage 1: the product must be settled before anything else.
        let product = match self.ensure_product(ctx, state).await? {
            ProductStep::Known(product) => product,
            ProductStep::SwitchAttempt(attempted) => {
                self.emit(state, "slot_engine.switch_detected", EventOutcome::Rejected);
                let delta = StateDelta::none().with_pending_switch(Some(attempted));
                return Ok(EngineOutcome { delta, reply: None });
            }
            ProductStep::Unknown => {
                let names = self.config.catalog.display_names();
                let delta = StateDelta {
                    pending_slot: Some(None),
                    rec_ready: Some(false),
                    ..StateDelta::none()
                };
                self.emit(state, "slot_engine.product_clarification", EventOutcome::Success);
                return Ok(EngineOutcome {
                    delta,
                    reply: Some(format!(
                        "Which product would you like a recommendation for? We offer: {names}."
                    )),
                });
            }
        };
        // A product with no catalog entry is corrupted state. The flow
        // recovers by forgetting the product and asking again.
        let Some(definition) = self.config.catalog.get(&product) else {
            warn!(
                error = %OrchestrationError::UnrecoverableStateCorruption(format!(
                    "product `{product}` has no catalog entry"
                )),
                "resetting product selection"
            );
            let names = self.config.catalog.display_names();
            let delta = StateDelta {
                product: Some(None),
                pending_slot: Some(None),
                rec_ready: Some(false),
                ..StateDelta::none()
            };
            self.emit(state, "slot_engine.corrupt_product", EventOutcome::Failed);
            return Ok(EngineOutcome {
                delta,
                reply: Some(format!(
                    "Which product would you like a recommendation for? We offer: {names}."
                )),
            });
        };
        let product_key = product.as_str();

        // Stage 2: pull slot values and any side question out of the
        // user's message.
        let extraction = self.extract(ctx, state, definition, product_key).await;
        let mut merged = state.slots.clone();
        for (slot, value) in &extraction.slots {
            if definition.required_slots.contains(slot) || slot == DECLINE_SLOT {
                merged.insert(slot.clone(), value.clone());
            }
        }

        // Product-specific asides outrank side questions: a trigger
        // phrase has a stored response and must short-circuit lookup.
        let aside = self
            .config
            .catalog
            .matching_aside(product_key, ctx.last_user_message())
            .map(|(_, aside)| aside.response);
        let side_question = if aside.is_some() { None } else { extraction.side_question.clone() };

        // Stage 3: validation and side-info lookup are independent, so
        // they run concurrently. The join is a hard barrier: resolve
        // never sees one without the other.
        let rules = self.config.rules.for_product(product_key);
        let validate_step = async {
            match rules {
                Some(rules) => validate_slots(rules, &merged),
                None => assure_core::ValidationReport { slots: merged.clone(), ..Default::default() },
            }
        };
        let side_step = async {
            match &side_question {
                Some(question) => match self.adapters.info_lookup.lookup(ctx, question).await {
                    Ok(answer) => Some(answer),
                    Err(error) => {
                        warn!(%error, "side info lookup failed");
                        None
                    }
                },
                None => None,
            }
        };
        let (report, looked_up) = tokio::join!(validate_step, side_step);
        let side_info = aside.or(looked_up).or_else(|| state.side_info.clone());

        // Guidance from this validation pass replaces stale guidance
        // for slots that are now valid.
        let mut guidance = state.slot_guidance.clone();
        guidance.retain(|slot, _| !report.slots.contains_key(slot));
        guidance.extend(report.guidance.clone());

        // Stage 4: resolve. Termination raised earlier ends the flow
        // before the missing list is recomputed: an explicit decline
        // captured in the slot map, or a closing message already sent
        // without the recommendation itself.
        let declined = report.slots.get(DECLINE_SLOT).map(String::as_str) == Some("yes");
        if declined || (state.rec_ready && !state.rec_given) {
            info!(product = %product_key, declined, "collection flow closed");
            self.emit(state, "slot_engine.flow_closed", EventOutcome::Success);
            let delta = StateDelta {
                product: Some(Some(product_key.to_owned())),
                slots: Some(report.slots),
                pending_slot: Some(None),
                is_slot_reask: Some(false),
                side_info: Some(None),
                rec_ready: Some(true),
                ..StateDelta::none()
            };
            let reply = side_info.unwrap_or_else(|| {
                "No problem at all. If you'd like to pick this up again or look at \
                 another product, just let me know."
                    .to_owned()
            });
            return Ok(EngineOutcome { delta, reply: Some(reply) });
        }

        // Every required slot valid means the flow is ready for the
        // recommendation; otherwise ask the next one.
        let missing = self.missing_by_priority(definition, product_key, &report.slots);
        if missing.is_empty() {
            self.emit(state, "slot_engine.recommendation", EventOutcome::Success);
            return self
                .generate_recommendation(ctx, definition, product_key, report.slots, side_info)
                .await;
        }

        self.emit(state, "slot_engine.ask_next", EventOutcome::Success);
        self.ask_next_slot(
            ctx,
            state,
            definition,
            product_key,
            report.slots,
            guidance,
            side_info,
            &missing,
        )
        .await
    }

    async fn ensure_product(
        &self,
        ctx: TurnContext<'_>,
        state: &SessionState,
    ) -> Result<ProductStep> {
        let detected = match self.adapters.product_detector.detect(ctx).await {
            Ok(detected) => detected.and_then(|raw| self.config.catalog.resolve(&raw)),
            Err(error) => {
                warn!(%error, "product detection failed");
                None
            }
        };

        if let (Some(detected), Some(current)) = (&detected, &state.product) {
            if !detected.eq_ignore_ascii_case(current) {
                warn!(%detected, %current, "switch attempt inside collection flow");
                return Ok(ProductStep::SwitchAttempt(detected.clone()));
            }
        }

        match state.product.clone().or(detected) {
            Some(product) => Ok(ProductStep::Known(product)),
            None => Ok(ProductStep::Unknown),
        }
    }

    /// Extraction prefers the cheap path: when the pending slot has an
    /// enum rule and the raw message already satisfies it, no adapter
    /// call is needed.
    async fn extract(
        &self,
        ctx: TurnContext<'_>,
        state: &SessionState,
        definition: &ProductDefinition,
        product_key: &str,
    ) -> SlotExtraction {
        if let Some(pending) = &state.pending_slot {
            if let Some(rules) = self.config.rules.for_product(product_key) {
                if let Some(entry) = rules.get(pending) {
                    if matches!(entry.rule, SlotRule::Enum { .. }) {
                        let candidate = BTreeMap::from([(
                            pending.clone(),
                            ctx.last_user_message().to_owned(),
                        )]);
                        let report = validate_slots(rules, &candidate);
                        if let Some(value) = report.slots.get(pending) {
                            debug!(slot = %pending, value = %value, "direct enum answer");
                            return SlotExtraction {
                                slots: BTreeMap::from([(pending.clone(), value.clone())]),
                                side_question: None,
                            };
                        }
                    }
                }
            }
        }

        match self.adapters.slot_extractor.extract(ctx, definition).await {
            Ok(extraction) => extraction,
            Err(error) => {
                warn!(%error, "slot extraction failed, extracting nothing");
                SlotExtraction::default()
            }
        }
    }

    fn missing_by_priority(
        &self,
        definition: &ProductDefinition,
        product_key: &str,
        slots: &BTreeMap<String, String>,
    ) -> Vec<String> {
        let mut missing: Vec<String> = definition
            .required_slots
            .iter()
            .filter(|slot| !slots.contains_key(slot.as_str()))
            .cloned()
            .collect();
        missing.sort_by_key(|slot| self.config.rules.priority(product_key, slot));
        missing
    }

    #[allow(clippy::too_many_arguments)]
    async fn ask_next_slot(
        &self,
        ctx: TurnContext<'_>,
        state: &SessionState,
        definition: &ProductDefinition,
        product_key: &str,
        slots: BTreeMap<String, String>,
        guidance: BTreeMap<String, String>,
        side_info: Option<String>,
        missing: &[String],
    ) -> Result<EngineOutcome> {
        let next_slot = &missing[0];
        let spec = definition.slots.get(next_slot);
        let description = spec
            .map(|spec| spec.description.clone())
            .unwrap_or_else(|| format!("information about {}", slot_label(next_slot)));

        // Fixed catalog questions bypass the writer entirely.
        let question = match spec.and_then(|spec| spec.question.clone()) {
            Some(fixed) => fixed,
            None => self
                .adapters
                .question_writer
                .write_question(ctx, definition, next_slot, &description)
                .await
                .unwrap_or_else(|error| {
                    warn!(%error, "question writer failed, using fallback");
                    format!("Could you please provide details for {}?", slot_label(next_slot))
                }),
        };

        // A re-ask repeats the same question with the stored guidance,
        // verbatim, so the user sees a consistent correction.
        let is_reask = state.pending_slot.as_deref() == Some(next_slot.as_str());
        let mut parts: Vec<String> = Vec::new();
        if let Some(info) = &side_info {
            parts.push(format!("{info}\n\nNow, back to your recommendation:"));
        }
        if is_reask {
            if let Some(stored) = guidance.get(next_slot) {
                parts.push(stored.clone());
            }
        }
        parts.push(question);
        let reply = parts.join("\n\n");

        info!(slot = %next_slot, product = %product_key, is_reask, "asking next slot");
        let delta = StateDelta {
            product: Some(Some(product_key.to_owned())),
            slots: Some(slots),
            pending_slot: Some(Some(next_slot.clone())),
            slot_guidance: Some(guidance),
            is_slot_reask: Some(is_reask),
            side_info: Some(None),
            rec_ready: Some(false),
            ..StateDelta::none()
        };
        Ok(EngineOutcome { delta, reply: Some(reply) })
    }

    async fn generate_recommendation(
        &self,
        ctx: TurnContext<'_>,
        definition: &ProductDefinition,
        product_key: &str,
        slots: BTreeMap<String, String>,
        side_info: Option<String>,
    ) -> Result<EngineOutcome> {
        // The tier is decided here, deterministically. The writer only
        // phrases it.
        let tier = select_tier(product_key, &slots);
        let text = self
            .adapters
            .recommendation_writer
            .write_recommendation(ctx, definition, tier, &slots)
            .await
            .unwrap_or_else(|error| {
                warn!(%error, "recommendation writer failed, using fallback");
                match tier {
                    Some(tier) => format!(
                        "Based on what you've shared, I recommend our {tier} plan for {} insurance.",
                        definition.name
                    ),
                    None => format!(
                        "Based on what you've shared, our {} plan looks like a good fit for you.",
                        definition.name
                    ),
                }
            });

        let reply = match &side_info {
            Some(info) => format!(
                "{info}\n\nNow, based on everything you've shared, here's my recommendation:\n\n{text}"
            ),
            None => text,
        };

        info!(product = %product_key, ?tier, "recommendation generated");
        let delta = StateDelta {
            product: Some(Some(product_key.to_owned())),
            slots: Some(slots),
            pending_slot: Some(None),
            slot_guidance: Some(BTreeMap::new()),
            is_slot_reask: Some(false),
            side_info: Some(None),
            rec_ready: Some(true),
            rec_given: Some(true),
            ..StateDelta::none()
        };
        Ok(EngineOutcome { delta, reply: Some(reply) })
    }

    fn emit(&self, state: &SessionState, event_type: &str, outcome: EventOutcome) {
        self.sink.emit(RoutingEvent::new(
            state.session_id,
            state.turn_count,
            event_type,
            EventCategory::SlotEngine,
            outcome,
        ));
    }
}

enum ProductStep {
    Known(String),
    SwitchAttempt(String),
    Unknown,
}

fn slot_label(slot_name: &str) -> String {
    slot_name.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use assure_core::{
        AgentConfig, FeedbackPrediction, InMemoryEventSink, IntentPrediction, Message,
        ProductDefinition, ReferenceContext, SessionState,
    };

    use super::SlotEngine;
    use crate::llm::{
        AdapterSet, FeedbackClassifier, InfoLookup, IntentClassifier, ProductDetector,
        QuestionWriter, RecommendationWriter, SlotExtraction, SlotExtractor, TurnContext,
    };

    struct NullIntent;

    #[async_trait]
    impl IntentClassifier for NullIntent {
        async fn classify(&self, _ctx: TurnContext<'_>) -> Result<IntentPrediction> {
            Ok(IntentPrediction::fallback(None, false))
        }
    }

    struct NullFeedback;

    #[async_trait]
    impl FeedbackClassifier for NullFeedback {
        async fn classify(&self, _ctx: TurnContext<'_>) -> Result<FeedbackPrediction> {
            Ok(FeedbackPrediction::default())
        }

        async fn rewrite(
            &self,
            _ctx: TurnContext<'_>,
            _previous_reply: &str,
        ) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct ScriptedExtractor(SlotExtraction);

    #[async_trait]
    impl SlotExtractor for ScriptedExtractor {
        async fn extract(
            &self,
            _ctx: TurnContext<'_>,
            _product: &ProductDefinition,
        ) -> Result<SlotExtraction> {
            Ok(self.0.clone())
        }
    }

    struct ScriptedLookup {
        answer: String,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InfoLookup for ScriptedLookup {
        async fn lookup(&self, _ctx: TurnContext<'_>, question: &str) -> Result<String> {
            self.calls.lock().expect("lock").push(question.to_owned());
            Ok(self.answer.clone())
        }
    }

    struct ScriptedDetector(Option<String>);

    #[async_trait]
    impl ProductDetector for ScriptedDetector {
        async fn detect(&self, _ctx: TurnContext<'_>) -> Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    struct EchoQuestion;

    #[async_trait]
    impl QuestionWriter for EchoQuestion {
        async fn write_question(
            &self,
            _ctx: TurnContext<'_>,
            _product: &ProductDefinition,
            slot: &str,
            _description: &str,
        ) -> Result<String> {
            Ok(format!("Please tell me your {}?", slot.replace('_', " ")))
        }
    }

    struct TierEcho;

    #[async_trait]
    impl RecommendationWriter for TierEcho {
        async fn write_recommendation(
            &self,
            _ctx: TurnContext<'_>,
            product: &ProductDefinition,
            tier: Option<&str>,
            _slots: &BTreeMap<String, String>,
        ) -> Result<String> {
            Ok(format!("{} plan: {}", product.name, tier.unwrap_or("n/a")))
        }
    }

    fn adapters(
        extraction: SlotExtraction,
        detected: Option<String>,
        lookup_answer: &str,
    ) -> AdapterSet {
        AdapterSet {
            intent: Box::new(NullIntent),
            feedback: Box::new(NullFeedback),
            slot_extractor: Box::new(ScriptedExtractor(extraction)),
            info_lookup: Box::new(ScriptedLookup {
                answer: lookup_answer.to_owned(),
                calls: Mutex::new(Vec::new()),
            }),
            product_detector: Box::new(ScriptedDetector(detected)),
            question_writer: Box::new(EchoQuestion),
            recommendation_writer: Box::new(TierEcho),
        }
    }

    fn extraction(pairs: &[(&str, &str)]) -> SlotExtraction {
        SlotExtraction {
            slots: pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            side_question: None,
        }
    }

    #[tokio::test]
    async fn unknown_product_asks_for_clarification() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(SlotExtraction::default(), None, "");
        let engine = SlotEngine::new(&config, &set, &sink);

        let state = SessionState::new();
        let messages = vec![Message::user("I want a recommendation")];
        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");

        let reply = outcome.reply.expect("clarification");
        assert!(reply.contains("Which product"));
        assert!(reply.contains("Travel"));
    }

    #[tokio::test]
    async fn switch_attempt_bails_out_with_pending_switch() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(SlotExtraction::default(), Some("car".to_owned()), "");
        let engine = SlotEngine::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.pending_slot = Some("destination".to_owned());
        let messages = vec![Message::user("let's do car insurance instead")];

        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");
        assert!(outcome.reply.is_none());
        assert_eq!(outcome.delta.pending_switch, Some(Some("car".to_owned())));
    }

    #[tokio::test]
    async fn asks_slots_in_priority_order() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(SlotExtraction::default(), Some("travel".to_owned()), "");
        let engine = SlotEngine::new(&config, &set, &sink);

        let state = SessionState::new();
        let messages = vec![Message::user("I need travel insurance")];
        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");

        // coverage_scope has priority 1, destination 2.
        assert_eq!(outcome.delta.pending_slot, Some(Some("coverage_scope".to_owned())));
        assert!(outcome.reply.is_some());
    }

    #[tokio::test]
    async fn invalid_answer_reasks_with_stored_guidance() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(
            extraction(&[("duration_of_insurance", "260 months")]),
            Some("maid".to_owned()),
            "",
        );
        let engine = SlotEngine::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("maid".to_owned());
        state.pending_slot = Some("duration_of_insurance".to_owned());
        let messages = vec![
            Message::assistant("How long should the policy run?"),
            Message::user("260 months"),
        ];

        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");
        let reply = outcome.reply.expect("re-ask");
        assert!(reply.contains("14, 26"));
        assert_eq!(outcome.delta.is_slot_reask, Some(true));
        assert_eq!(
            outcome.delta.pending_slot,
            Some(Some("duration_of_insurance".to_owned()))
        );
        // The invalid value must not survive into the slot map.
        let slots = outcome.delta.slots.expect("slots");
        assert!(!slots.contains_key("duration_of_insurance"));
    }

    #[tokio::test]
    async fn direct_enum_answer_skips_the_extractor() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        // Extractor would return nothing; the enum shortcut must fill
        // the slot anyway.
        let set = adapters(SlotExtraction::default(), Some("travel".to_owned()), "");
        let engine = SlotEngine::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.pending_slot = Some("coverage_scope".to_owned());
        let messages = vec![
            Message::assistant("Who should the plan cover?"),
            Message::user("just me please"),
        ];

        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");
        let slots = outcome.delta.slots.expect("slots");
        assert_eq!(slots.get("coverage_scope").map(String::as_str), Some("self"));
        // Next missing slot is the destination.
        assert_eq!(outcome.delta.pending_slot, Some(Some("destination".to_owned())));
    }

    #[tokio::test]
    async fn side_question_is_answered_and_flow_continues() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let mut extraction = SlotExtraction::default();
        extraction.side_question = Some("what does coverage scope mean?".to_owned());
        let set = adapters(
            extraction,
            Some("travel".to_owned()),
            "Coverage scope is who the plan protects.",
        );
        let engine = SlotEngine::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.pending_slot = Some("coverage_scope".to_owned());
        let messages = vec![
            Message::assistant("Who should the plan cover?"),
            Message::user("what does coverage scope mean?"),
        ];

        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");
        let reply = outcome.reply.expect("reply");
        assert!(reply.contains("Coverage scope is who the plan protects."));
        assert!(reply.contains("back to your recommendation"));
        // The same question is asked again after the answer.
        assert_eq!(outcome.delta.pending_slot, Some(Some("coverage_scope".to_owned())));
    }

    #[tokio::test]
    async fn exception_trigger_short_circuits_side_lookup() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(SlotExtraction::default(), Some("early".to_owned()), "unused");
        let engine = SlotEngine::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("early".to_owned());
        state.pending_slot = Some("existing_cover".to_owned());
        let messages = vec![
            Message::assistant("Do you have existing critical illness cover?"),
            Message::user("well I have medical insurance already"),
        ];

        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");
        let reply = outcome.reply.expect("reply");
        // The stored aside response is used, not the info lookup.
        assert!(!reply.contains("unused"));
        assert!(reply.len() > 30);
    }

    #[tokio::test]
    async fn declined_interview_closes_instead_of_asking_again() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(
            extraction(&[("flow_declined", "yes")]),
            Some("fraud".to_owned()),
            "",
        );
        let engine = SlotEngine::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("fraud".to_owned());
        state.pending_slot = Some("purchase_frequency".to_owned());
        let messages = vec![
            Message::assistant("How often do you shop online - daily, weekly, or monthly?"),
            Message::user("no thanks, I'm not interested"),
        ];

        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");
        let reply = outcome.reply.expect("closing reply");
        assert!(reply.contains("let me know"));
        assert!(!reply.contains("How often"));
        assert_eq!(outcome.delta.pending_slot, Some(None));
        assert_eq!(outcome.delta.rec_ready, Some(true));
    }

    #[tokio::test]
    async fn closed_flow_stays_closed_on_the_next_turn() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(SlotExtraction::default(), Some("travel".to_owned()), "");
        let engine = SlotEngine::new(&config, &set, &sink);

        // A closing message went out already without a recommendation.
        let mut state = SessionState::new();
        state.product = Some("travel".to_owned());
        state.rec_ready = true;
        let messages = vec![Message::user("hm, okay")];

        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");
        assert_eq!(outcome.delta.pending_slot, Some(None));
        assert!(!outcome.reply.expect("reply").contains('?'));
    }

    #[tokio::test]
    async fn all_slots_filled_generates_recommendation() {
        let config = AgentConfig::default();
        let sink = InMemoryEventSink::default();
        let set = adapters(
            extraction(&[("desired_amount", "3000")]),
            Some("personalaccident".to_owned()),
            "",
        );
        let engine = SlotEngine::new(&config, &set, &sink);

        let mut state = SessionState::new();
        state.product = Some("personalaccident".to_owned());
        state.pending_slot = Some("desired_amount".to_owned());
        state.slots.insert("coverage_scope".to_owned(), "self".to_owned());
        state.slots.insert("risk_level".to_owned(), "low".to_owned());
        let messages = vec![
            Message::assistant("How much coverage would you like?"),
            Message::user("3000"),
        ];

        let outcome =
            engine.run(&messages, &state, &ReferenceContext::default()).await.expect("run");
        let reply = outcome.reply.expect("recommendation");
        assert!(reply.contains("Platinum"));
        assert_eq!(outcome.delta.rec_given, Some(true));
        assert_eq!(outcome.delta.pending_slot, Some(None));
    }
}
