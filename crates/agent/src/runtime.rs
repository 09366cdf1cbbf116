use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use assure_core::{
    last_user_message, AgentConfig, EventSink, Intent, Message, NullEventSink, Phase, RouteTarget,
    SessionState,
};

use crate::llm::{AdapterSet, TurnContext};
use crate::router::Router;
use crate::service::ServiceFlow;
use crate::slots::SlotEngine;

pub const FALLBACK_REPLY: &str =
    "I'm sorry, I didn't quite catch that. Could you rephrase your question?";

/// What one turn produced for the caller.
#[derive(Debug)]
pub struct TurnOutcome {
    pub reply: String,
    pub target: RouteTarget,
    pub phase: Phase,
}

/// Owns a turn end to end: route, apply the directive, dispatch the
/// target handler, settle the phase. Callers hold the session state and
/// must serialize turns per session themselves.
pub struct AgentRuntime {
    config: AgentConfig,
    adapters: AdapterSet,
    sink: Arc<dyn EventSink>,
}

impl AgentRuntime {
    pub fn new(config: AgentConfig, adapters: AdapterSet) -> Self {
        Self::with_sink(config, adapters, Arc::new(NullEventSink))
    }

    pub fn with_sink(config: AgentConfig, adapters: AdapterSet, sink: Arc<dyn EventSink>) -> Self {
        Self { config, adapters, sink }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Runs one user turn. The loop re-enters the router when a handler
    /// bails out with new state (a switch attempt detected mid flow), so
    /// a turn can take several hops but always ends with a reply.
    pub async fn handle_turn(
        &self,
        state: &mut SessionState,
        messages: &[Message],
    ) -> Result<TurnOutcome> {
        let router = Router::new(&self.config, &self.adapters, self.sink.as_ref());

        let mut hops = 0u32;
        let (reply, target, intent) = loop {
            hops += 1;
            if hops > self.config.engine.max_turn_hops {
                warn!(hops, "turn hop bound hit, falling back");
                break (FALLBACK_REPLY.to_owned(), RouteTarget::EndTurn, Intent::Other);
            }

            let decision = router.route(messages, state).await?;
            let target = decision.directive.target;
            let intent = decision.intent;
            state.apply(&decision.directive.delta);
            if decision.directive.delta.reset {
                state.phase.reset();
            }
            debug!(hop = hops, target = target.as_str(), "dispatching");

            match target {
                RouteTarget::EndTurn | RouteTarget::Escalation => {
                    break (decision.reply.unwrap_or_default(), target, intent);
                }
                RouteTarget::Greeting => {
                    break (self.greeting(), target, intent);
                }
                RouteTarget::ProductSelection => {
                    break (self.product_clarification(), target, intent);
                }
                RouteTarget::SlotEngine => {
                    let engine = SlotEngine::new(&self.config, &self.adapters, self.sink.as_ref());
                    let outcome = engine.run(messages, state, &decision.reference).await?;
                    state.apply(&outcome.delta);
                    match outcome.reply {
                        Some(reply) => break (reply, target, intent),
                        // A switch attempt was recorded; the router's
                        // rejection guard answers on the next hop.
                        None => continue,
                    }
                }
                RouteTarget::InfoQuery | RouteTarget::Recommendation => {
                    let ctx = TurnContext::new(messages, state, &decision.reference);
                    let reply = self.answer_question(ctx, last_user_message(messages)).await;
                    break (reply, target, intent);
                }
                RouteTarget::Comparison => {
                    let ctx = TurnContext::new(messages, state, &decision.reference);
                    let question = comparison_question(
                        last_user_message(messages),
                        &decision.reference.compared_items,
                    );
                    break (self.answer_question(ctx, &question).await, target, intent);
                }
                RouteTarget::Purchase => {
                    state.purchase_offered = true;
                    break (self.purchase_offer(state), target, intent);
                }
                RouteTarget::ServiceFlow => {
                    let flow = ServiceFlow::new(self.sink.as_ref());
                    let outcome = flow.handle(messages, state);
                    state.apply(&outcome.delta);
                    break (outcome.reply, target, intent);
                }
            }
        };

        self.settle_phase(state, target, intent);
        state.turn_count += 1;

        // Last line of defense: a turn never ends silent.
        let reply = if reply.trim().is_empty() {
            warn!(target = target.as_str(), "empty reply from handler, using fallback");
            FALLBACK_REPLY.to_owned()
        } else {
            reply
        };

        info!(
            turn = state.turn_count,
            target = target.as_str(),
            phase = state.phase.current().as_str(),
            "turn complete"
        );
        Ok(TurnOutcome { reply, target, phase: state.phase.current() })
    }

    async fn answer_question(&self, ctx: TurnContext<'_>, question: &str) -> String {
        match self.adapters.info_lookup.lookup(ctx, question).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(%error, "info lookup failed");
                "I'm sorry, I couldn't find that information right now. \
                 Is there anything else I can help you with?"
                    .to_owned()
            }
        }
    }

    fn greeting(&self) -> String {
        format!(
            "Hello! I'm your insurance assistant. I can answer questions, compare plans, \
             and put together a recommendation for {} insurance. How can I help you today?",
            self.config.catalog.display_names()
        )
    }

    fn product_clarification(&self) -> String {
        format!(
            "Which product would you like a recommendation for? We offer: {}.",
            self.config.catalog.display_names()
        )
    }

    fn purchase_offer(&self, state: &SessionState) -> String {
        match state.product.as_deref().and_then(|key| self.config.catalog.get(key)) {
            Some(product) => format!(
                "Great choice! You can purchase the {} plan through our secure online portal, \
                 or I can have an advisor call you to complete the purchase. \
                 Which would you prefer?",
                product.name
            ),
            None => "Happy to help with a purchase. Which product would you like to buy?"
                .to_owned(),
        }
    }

    /// The phase is derived from the turn's intent and the settled
    /// state flags. Canned end-of-turn replies (rejections, resets,
    /// nudges) keep the phase unless an escalation was flagged.
    fn settle_phase(&self, state: &mut SessionState, target: RouteTarget, intent: Intent) {
        if target == RouteTarget::EndTurn && !state.live_agent_requested {
            return;
        }
        let next = Phase::derive(
            intent,
            state.product.is_some(),
            state.rec_given,
            state.purchase_offered,
            state.live_agent_requested,
        );
        state.phase.transition(next);
    }
}

fn comparison_question(user_text: &str, compared_items: &[String]) -> String {
    if compared_items.is_empty() {
        user_text.to_owned()
    } else {
        format!("{user_text} (comparing: {})", compared_items.join(" vs "))
    }
}
