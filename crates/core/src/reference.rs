use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::message::{recent, Message, Role, RECENT_WINDOW};

const TIER_KEYWORDS: [&str; 11] = [
    "gold", "silver", "platinum", "basic", "bronze", "essential", "premier", "premium",
    "standard", "titanium", "enhanced",
];

const MAX_COMPARED_ITEMS: usize = 3;

/// Resolved antecedents for pronouns and elliptical follow-ups
/// ("is it covered there?", "what about the other one?"), rebuilt from
/// the recent window each turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceContext {
    pub last_mentioned_product: Option<String>,
    pub last_mentioned_tier: Option<String>,
    pub last_mentioned_destination: Option<String>,
    pub compared_items: Vec<String>,
    pub last_bot_question: Option<String>,
}

impl ReferenceContext {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Walks the recent window newest-first. Each field is filled from the
/// most recent assistant message that carries it; session state supplies
/// the product and destination directly.
pub fn extract_reference_context(
    messages: &[Message],
    current_product: Option<&str>,
    current_slots: &BTreeMap<String, String>,
) -> ReferenceContext {
    let mut context = ReferenceContext {
        last_mentioned_product: current_product.map(str::to_owned),
        ..Default::default()
    };

    if let Some(destination) =
        current_slots.get("destination").or_else(|| current_slots.get("travel_destination"))
    {
        context.last_mentioned_destination = Some(destination.clone());
    }

    for message in recent(messages, RECENT_WINDOW).iter().rev() {
        if message.role != Role::Assistant {
            continue;
        }
        let content = message.content.to_ascii_lowercase();

        if context.last_bot_question.is_none() {
            if let Some(question_end) = content.rfind('?') {
                let sentence_start = content[..question_end]
                    .rfind(['.', '\n'])
                    .map(|index| index + 1)
                    .unwrap_or(0);
                let question = content[sentence_start..=question_end].trim();
                if !question.is_empty() {
                    context.last_bot_question = Some(question.to_owned());
                }
            }
        }

        if context.last_mentioned_tier.is_none() {
            if let Some(tier) = TIER_KEYWORDS.iter().find(|tier| content.contains(*tier)) {
                context.last_mentioned_tier = Some(capitalize(tier));
            }
        }

        if context.compared_items.is_empty()
            && ["compare", "vs", "difference"].iter().any(|marker| content.contains(marker))
        {
            let found: Vec<String> = TIER_KEYWORDS
                .iter()
                .filter(|tier| content.contains(*tier))
                .map(|tier| capitalize(tier))
                .take(MAX_COMPARED_ITEMS)
                .collect();
            if found.len() >= 2 {
                context.compared_items = found;
            }
        }
    }

    context
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::extract_reference_context;
    use crate::message::Message;

    #[test]
    fn picks_latest_bot_question_and_tier() {
        let messages = vec![
            Message::assistant("The Gold plan covers overseas surgery. Anything else?"),
            Message::user("hmm"),
            Message::assistant("Great choice. Which country will your helper come from?"),
        ];
        let context = extract_reference_context(&messages, Some("maid"), &BTreeMap::new());

        assert_eq!(
            context.last_bot_question.as_deref(),
            Some("which country will your helper come from?")
        );
        assert_eq!(context.last_mentioned_tier.as_deref(), Some("Gold"));
        assert_eq!(context.last_mentioned_product.as_deref(), Some("maid"));
    }

    #[test]
    fn compared_items_need_two_tiers_and_a_marker() {
        let messages = vec![Message::assistant(
            "Here is the difference: Silver covers up to 200k while Platinum covers 500k.",
        )];
        let context = extract_reference_context(&messages, None, &BTreeMap::new());
        assert_eq!(context.compared_items, vec!["Silver".to_owned(), "Platinum".to_owned()]);

        let lone = vec![Message::assistant("The Gold plan is a solid difference maker.")];
        let context = extract_reference_context(&lone, None, &BTreeMap::new());
        assert!(context.compared_items.is_empty());
    }

    #[test]
    fn destination_comes_from_slots() {
        let slots = BTreeMap::from([("destination".to_owned(), "Japan".to_owned())]);
        let context = extract_reference_context(&[], None, &slots);
        assert_eq!(context.last_mentioned_destination.as_deref(), Some("Japan"));
        assert!(context.last_bot_question.is_none());
    }
}
