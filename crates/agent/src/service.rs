use tracing::{debug, info};

use assure_core::{
    last_user_message, EventCategory, EventOutcome, EventSink, Message, RoutingEvent, SessionState,
    StateDelta,
};

/// Service actions this flow can carry out. When no action can be
/// settled from the conversation the user is asked to pick one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceAction {
    ClaimStatus,
    PolicyStatus,
    UpdateEmail,
    UpdateMobile,
    UpdateAddress,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClaimStatus => "claim_status",
            Self::PolicyStatus => "policy_status",
            Self::UpdateEmail => "update_email",
            Self::UpdateMobile => "update_mobile",
            Self::UpdateAddress => "update_address",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "claim_status" => Some(Self::ClaimStatus),
            "policy_status" => Some(Self::PolicyStatus),
            "update_email" => Some(Self::UpdateEmail),
            "update_mobile" => Some(Self::UpdateMobile),
            "update_address" => Some(Self::UpdateAddress),
            _ => None,
        }
    }

    fn detect(text: &str) -> Option<Self> {
        let lowered = text.to_ascii_lowercase();
        if lowered.contains("claim") {
            Some(Self::ClaimStatus)
        } else if lowered.contains("email") {
            Some(Self::UpdateEmail)
        } else if lowered.contains("mobile") || lowered.contains("phone") {
            Some(Self::UpdateMobile)
        } else if lowered.contains("address") {
            Some(Self::UpdateAddress)
        } else if lowered.contains("policy") || lowered.contains("status") {
            Some(Self::PolicyStatus)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct ServiceOutcome {
    pub delta: StateDelta,
    pub reply: String,
}

/// Policy service flow: settle the requested action, verify the
/// customer, then acknowledge the request. Credential fragments are
/// short and ambiguous, so the router pins the session here until the
/// flow finishes.
pub struct ServiceFlow<'a> {
    sink: &'a dyn EventSink,
}

impl<'a> ServiceFlow<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink }
    }

    pub fn handle(&self, messages: &[Message], state: &SessionState) -> ServiceOutcome {
        let user_text = last_user_message(messages);

        // Settle the action first so the user knows what is being
        // verified for.
        let action = state
            .service_action
            .as_deref()
            .and_then(ServiceAction::parse)
            .or_else(|| ServiceAction::detect(user_text));
        let Some(action) = action else {
            self.emit(state, "service.ask_action", EventOutcome::Success);
            return ServiceOutcome {
                delta: StateDelta::none(),
                reply: "I can help you check a claim or policy status, or update your email, \
                        mobile number, or mailing address. What would you like to do?"
                    .to_owned(),
            };
        };

        if !state.customer_validated {
            return self.collect_credentials(state, user_text, action);
        }

        self.execute(state, action)
    }

    fn collect_credentials(
        &self,
        state: &SessionState,
        user_text: &str,
        action: ServiceAction,
    ) -> ServiceOutcome {
        let mut slots = state.service_slots.clone();
        if let Some(policy_no) = extract_policy_no(user_text) {
            slots.insert("policy_no".to_owned(), policy_no);
        }
        if state.service_pending_slot.as_deref() == Some("full_name") {
            if let Some(name) = extract_full_name(user_text) {
                slots.insert("full_name".to_owned(), name);
            }
        }

        let has_policy = slots.contains_key("policy_no");
        let has_name = slots.contains_key("full_name");

        if has_policy && has_name {
            info!(action = action.as_str(), "customer verified");
            self.emit(state, "service.validated", EventOutcome::Success);
            let mut delta = StateDelta {
                customer_validated: Some(true),
                service_slots: Some(slots),
                service_pending_slot: Some(None),
                service_action: Some(Some(action.as_str().to_owned())),
                ..StateDelta::none()
            };
            let done = self.execute(state, action);
            merge_service_fields(&mut delta, done.delta);
            return ServiceOutcome { delta, reply: done.reply };
        }

        let (pending, question) = if !has_policy {
            let guidance = policy_no_guidance(user_text);
            ("policy_no", guidance)
        } else {
            (
                "full_name",
                "Thanks. And could I have your full name as it appears on the policy?".to_owned(),
            )
        };

        debug!(pending, "waiting on customer credential");
        self.emit(state, "service.ask_credential", EventOutcome::Success);
        ServiceOutcome {
            delta: StateDelta {
                service_slots: Some(slots),
                service_pending_slot: Some(Some(pending.to_owned())),
                service_action: Some(Some(action.as_str().to_owned())),
                ..StateDelta::none()
            },
            reply: question,
        }
    }

    /// No outbound I/O happens here. The flow acknowledges the request
    /// and closes its transient state; fulfilment belongs to the
    /// service desk integration behind it.
    fn execute(&self, state: &SessionState, action: ServiceAction) -> ServiceOutcome {
        let reply = match action {
            ServiceAction::ClaimStatus => {
                "You're verified. I've raised a claim status check for you; \
                 you'll receive the latest update at your registered contact shortly."
            }
            ServiceAction::PolicyStatus => {
                "You're verified. I've raised a policy status check for you; \
                 you'll receive the details at your registered contact shortly."
            }
            ServiceAction::UpdateEmail => {
                "You're verified. I've logged your request to update the email address \
                 on file. You'll receive a confirmation once the change is made."
            }
            ServiceAction::UpdateMobile => {
                "You're verified. I've logged your request to update the mobile number \
                 on file. You'll receive a confirmation once the change is made."
            }
            ServiceAction::UpdateAddress => {
                "You're verified. I've logged your request to update the mailing address \
                 on file. You'll receive a confirmation once the change is made."
            }
        };

        info!(action = action.as_str(), "service request acknowledged");
        self.emit(state, "service.executed", EventOutcome::Success);
        ServiceOutcome {
            delta: StateDelta {
                service_action: Some(None),
                service_pending_slot: Some(None),
                ..StateDelta::none()
            },
            reply: reply.to_owned(),
        }
    }

    fn emit(&self, state: &SessionState, event_type: &str, outcome: EventOutcome) {
        self.sink.emit(RoutingEvent::new(
            state.session_id,
            state.turn_count,
            event_type,
            EventCategory::Routing,
            outcome,
        ));
    }
}

fn merge_service_fields(delta: &mut StateDelta, done: StateDelta) {
    if let Some(action) = done.service_action {
        delta.service_action = Some(action);
    }
    if let Some(pending) = done.service_pending_slot {
        delta.service_pending_slot = Some(pending);
    }
}

/// Policy numbers are two letters followed by six digits (e.g. DY300318).
fn extract_policy_no(text: &str) -> Option<String> {
    for token in text.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.len() != 8 {
            continue;
        }
        let upper = token.to_ascii_uppercase();
        let bytes = upper.as_bytes();
        let letters_ok = bytes[..2].iter().all(u8::is_ascii_uppercase);
        let digits_ok = bytes[2..].iter().all(u8::is_ascii_digit);
        if letters_ok && digits_ok {
            return Some(upper);
        }
    }
    None
}

fn policy_no_guidance(text: &str) -> String {
    let candidate = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find(|token| token.len() >= 4 && token.chars().any(|c| c.is_ascii_digit()));
    match candidate {
        Some(token) if token.len() < 8 => {
            "That policy number seems too short. It should be 2 letters followed by \
             6 digits (e.g., DY300318). Could you check and send it again?"
                .to_owned()
        }
        Some(token) if token.len() > 8 => {
            "That policy number seems too long. It should be 2 letters followed by \
             6 digits (e.g., DY300318). Could you check and send it again?"
                .to_owned()
        }
        Some(_) => {
            "That doesn't look like a valid policy number. It should be 2 letters \
             followed by 6 digits (e.g., DY300318)."
                .to_owned()
        }
        None => {
            "To verify your identity, could I have your policy number? It's 2 letters \
             followed by 6 digits (e.g., DY300318)."
                .to_owned()
        }
    }
}

/// A name answer is a short run of alphabetic words. Anything with
/// digits or sentence length is not treated as a name.
fn extract_full_name(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || words.len() > 4 {
        return None;
    }
    if words.iter().all(|word| word.chars().all(|c| c.is_alphabetic() || c == '-')) {
        Some(words.join(" "))
    } else {
        None
    }
}
