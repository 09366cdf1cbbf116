use serde::{Deserialize, Serialize};

/// Window of trailing messages scanned for tool errors and escalation cues.
pub const RECENT_WINDOW: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

/// One entry of the per-session transcript handed to the router each turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_status: Option<ToolStatus>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_name: None, tool_status: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_name: None, tool_status: None }
    }

    pub fn tool(
        name: impl Into<String>,
        content: impl Into<String>,
        status: ToolStatus,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_name: Some(name.into()),
            tool_status: Some(status),
        }
    }

    pub fn is_tool_error(&self) -> bool {
        self.role == Role::Tool && self.tool_status == Some(ToolStatus::Error)
    }
}

/// Last user message in the transcript, trimmed; empty string when absent.
pub fn last_user_message(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|message| message.role == Role::User)
        .map(|message| message.content.trim())
        .unwrap_or("")
}

/// Most recent (assistant, user) pair, for feedback classification.
pub fn last_turn(messages: &[Message]) -> Option<(&Message, &Message)> {
    let user_index = messages.iter().rposition(|message| message.role == Role::User)?;
    let assistant = messages[..user_index]
        .iter()
        .rev()
        .find(|message| message.role == Role::Assistant)?;
    Some((assistant, &messages[user_index]))
}

/// Tool errors within the trailing [`RECENT_WINDOW`] messages.
pub fn recent_tool_error_count(messages: &[Message]) -> usize {
    recent(messages, RECENT_WINDOW).iter().filter(|message| message.is_tool_error()).count()
}

/// Up to the last three tool-error summaries, oldest first.
pub fn recent_tool_errors(messages: &[Message]) -> Vec<(String, String)> {
    let mut errors: Vec<(String, String)> = recent(messages, RECENT_WINDOW)
        .iter()
        .filter(|message| message.is_tool_error())
        .map(|message| {
            let name = message.tool_name.clone().unwrap_or_else(|| "unknown".to_string());
            let mut content = message.content.clone();
            content.truncate(200);
            (name, content)
        })
        .collect();
    if errors.len() > 3 {
        errors.drain(..errors.len() - 3);
    }
    errors
}

pub fn recent(messages: &[Message], window: usize) -> &[Message] {
    let start = messages.len().saturating_sub(window);
    &messages[start..]
}

#[cfg(test)]
mod tests {
    use super::{
        last_turn, last_user_message, recent_tool_error_count, recent_tool_errors, Message,
        ToolStatus,
    };

    #[test]
    fn last_user_message_skips_assistant_turns() {
        let messages = vec![
            Message::user("hello"),
            Message::assistant("hi, how can I help?"),
            Message::user("  travel insurance  "),
        ];
        assert_eq!(last_user_message(&messages), "travel insurance");
    }

    #[test]
    fn last_turn_pairs_answer_with_followup() {
        let messages = vec![
            Message::user("tell me about maid insurance"),
            Message::assistant("Maid insurance covers your helper."),
            Message::user("that was not helpful"),
        ];
        let (assistant, user) = last_turn(&messages).expect("turn pair");
        assert!(assistant.content.contains("helper"));
        assert_eq!(user.content, "that was not helpful");
    }

    #[test]
    fn tool_errors_counted_only_in_recent_window() {
        let mut messages = vec![Message::tool("lookup", "timeout", ToolStatus::Error)];
        for index in 0..10 {
            messages.push(Message::user(format!("message {index}")));
        }
        assert_eq!(recent_tool_error_count(&messages), 0);

        messages.push(Message::tool("lookup", "timeout again", ToolStatus::Error));
        messages.push(Message::tool("lookup", "ok", ToolStatus::Success));
        assert_eq!(recent_tool_error_count(&messages), 1);
    }

    #[test]
    fn recent_tool_errors_keeps_last_three() {
        let messages: Vec<Message> = (0..5)
            .map(|index| Message::tool("lookup", format!("failure {index}"), ToolStatus::Error))
            .collect();
        let errors = recent_tool_errors(&messages);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].1, "failure 2");
        assert_eq!(errors[2].1, "failure 4");
    }
}
