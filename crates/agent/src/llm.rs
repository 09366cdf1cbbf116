use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use assure_core::{
    FeedbackPrediction, IntentPrediction, Message, ProductDefinition, ReferenceContext,
    SessionState,
};

/// Everything the language adapters may look at for one turn. Borrowed
/// so the router can hand the same view to several adapters running
/// concurrently.
#[derive(Clone, Copy, Debug)]
pub struct TurnContext<'a> {
    pub messages: &'a [Message],
    pub state: &'a SessionState,
    pub reference: &'a ReferenceContext,
}

impl<'a> TurnContext<'a> {
    pub fn new(
        messages: &'a [Message],
        state: &'a SessionState,
        reference: &'a ReferenceContext,
    ) -> Self {
        Self { messages, state, reference }
    }

    pub fn last_user_message(&self) -> &str {
        assure_core::message::last_user_message(self.messages)
    }
}

/// What the slot extractor pulled out of the user's message: raw slot
/// values plus an off-path question, when one was asked alongside.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotExtraction {
    pub slots: BTreeMap<String, String>,
    pub side_question: Option<String>,
}

/// Classifies the user's latest message into a routing intent, with an
/// optional product mention and an explicit-reset signal.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, ctx: TurnContext<'_>) -> Result<IntentPrediction>;
}

/// Judges the user's reaction to the previous reply, and rewrites that
/// reply when the reaction was negative.
#[async_trait]
pub trait FeedbackClassifier: Send + Sync {
    async fn classify(&self, ctx: TurnContext<'_>) -> Result<FeedbackPrediction>;

    async fn rewrite(&self, ctx: TurnContext<'_>, previous_reply: &str) -> Result<Option<String>>;
}

/// Pulls slot values out of free text for the active product.
#[async_trait]
pub trait SlotExtractor: Send + Sync {
    async fn extract(
        &self,
        ctx: TurnContext<'_>,
        product: &ProductDefinition,
    ) -> Result<SlotExtraction>;
}

/// Answers an off-path question without leaving the collection flow.
#[async_trait]
pub trait InfoLookup: Send + Sync {
    async fn lookup(&self, ctx: TurnContext<'_>, question: &str) -> Result<String>;
}

/// Detects which catalog product the user is talking about, if any.
#[async_trait]
pub trait ProductDetector: Send + Sync {
    async fn detect(&self, ctx: TurnContext<'_>) -> Result<Option<String>>;
}

/// Phrases the question for the next missing slot. Slots with a fixed
/// question in the catalog never reach this adapter.
#[async_trait]
pub trait QuestionWriter: Send + Sync {
    async fn write_question(
        &self,
        ctx: TurnContext<'_>,
        product: &ProductDefinition,
        slot: &str,
        description: &str,
    ) -> Result<String>;
}

/// Renders the final recommendation text once the tier is picked. The
/// tier itself is decided deterministically before this adapter runs.
#[async_trait]
pub trait RecommendationWriter: Send + Sync {
    async fn write_recommendation(
        &self,
        ctx: TurnContext<'_>,
        product: &ProductDefinition,
        tier: Option<&str>,
        slots: &BTreeMap<String, String>,
    ) -> Result<String>;
}

/// The full adapter set the runtime needs. Grouped so call sites take
/// one bundle instead of seven generic parameters.
pub struct AdapterSet {
    pub intent: Box<dyn IntentClassifier>,
    pub feedback: Box<dyn FeedbackClassifier>,
    pub slot_extractor: Box<dyn SlotExtractor>,
    pub info_lookup: Box<dyn InfoLookup>,
    pub product_detector: Box<dyn ProductDetector>,
    pub question_writer: Box<dyn QuestionWriter>,
    pub recommendation_writer: Box<dyn RecommendationWriter>,
}
