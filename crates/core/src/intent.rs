use serde::{Deserialize, Serialize};

/// Closed intent set produced by the external classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Info,
    Summary,
    Compare,
    Recommend,
    Purchase,
    Capabilities,
    Greet,
    Chat,
    PolicyService,
    Other,
}

impl Intent {
    /// Normalize a raw classifier label; anything unknown becomes `Chat`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "info" => Intent::Info,
            "summary" => Intent::Summary,
            "compare" => Intent::Compare,
            "recommend" => Intent::Recommend,
            "purchase" => Intent::Purchase,
            "capabilities" => Intent::Capabilities,
            "greet" => Intent::Greet,
            "policy_service" => Intent::PolicyService,
            "other" => Intent::Other,
            _ => Intent::Chat,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Info => "info",
            Intent::Summary => "summary",
            Intent::Compare => "compare",
            Intent::Recommend => "recommend",
            Intent::Purchase => "purchase",
            Intent::Capabilities => "capabilities",
            Intent::Greet => "greet",
            Intent::Chat => "chat",
            Intent::PolicyService => "policy_service",
            Intent::Other => "other",
        }
    }
}

/// Classifier output: intent, optional product, independent reset flag.
///
/// `reset = true` takes precedence over everything else downstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentPrediction {
    pub intent: Intent,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub reason: String,
}

impl IntentPrediction {
    /// Safe fallback when classification fails or there is no history.
    pub fn fallback(known_product: Option<&str>, has_history: bool) -> Self {
        Self {
            intent: if has_history { Intent::Info } else { Intent::Chat },
            product: known_product.map(str::to_owned),
            reset: false,
            reason: "classification_failed".to_owned(),
        }
    }
}

/// How the user is reacting to the previous answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    NegativeFeedback,
    Ack,
    Clarification,
    NewQuestion,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPrediction {
    pub category: FeedbackCategory,
    #[serde(default)]
    pub reason: String,
}

impl Default for FeedbackPrediction {
    fn default() -> Self {
        Self { category: FeedbackCategory::Other, reason: String::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::{Intent, IntentPrediction};

    #[test]
    fn unknown_labels_normalize_to_chat() {
        assert_eq!(Intent::normalize("banter"), Intent::Chat);
        assert_eq!(Intent::normalize(""), Intent::Chat);
        assert_eq!(Intent::normalize("  RECOMMEND "), Intent::Recommend);
        assert_eq!(Intent::normalize("policy_service"), Intent::PolicyService);
    }

    #[test]
    fn fallback_depends_on_history_presence() {
        assert_eq!(IntentPrediction::fallback(None, true).intent, Intent::Info);
        assert_eq!(IntentPrediction::fallback(None, false).intent, Intent::Chat);
        assert_eq!(
            IntentPrediction::fallback(Some("travel"), true).product.as_deref(),
            Some("travel")
        );
    }
}
