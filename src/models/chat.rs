use chrono::{ Local, TimeZone, Utc };
use serde::{ Serialize, Deserialize };
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a chat turn is answered from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Generate,
    Document,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Content prefixed with a `YYYY-MM-DD HH:MM:` header line in local time.
    pub fn stamped(&self) -> String {
        let when = Local.timestamp_opt(self.timestamp, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        format!("{}:\n\n{}", when, self.content)
    }
}

/// Ordered, append-only message history of one session.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionLog {
    messages: Vec<ChatMessage>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The last `limit` messages, oldest first.
    pub fn recent(&self, limit: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    /// Records the user message and returns a handle that appends the
    /// assistant reply only when committed. Dropping the handle leaves the
    /// user entry alone in the log.
    pub fn begin_turn(&mut self, prompt: &str) -> PendingTurn<'_> {
        self.messages.push(ChatMessage::new(Role::User, prompt));
        PendingTurn {
            log: self,
            reply: String::new(),
        }
    }
}

pub struct PendingTurn<'a> {
    log: &'a mut SessionLog,
    reply: String,
}

impl<'a> PendingTurn<'a> {
    pub fn push_fragment(&mut self, fragment: &str) {
        self.reply.push_str(fragment);
    }

    pub fn commit(self) -> ChatMessage {
        let message = ChatMessage::new(Role::Assistant, self.reply);
        self.log.messages.push(message.clone());
        message
    }
}

pub fn format_history_for_prompt(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let mut result = String::from("Previous conversation:\n");
    for msg in messages {
        let role_display = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        result.push_str(&format!("{}: {}\n", role_display, msg.content));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_turn_appends_user_then_assistant() {
        let mut log = SessionLog::new();
        let mut turn = log.begin_turn("hi");
        turn.push_fragment("Hel");
        turn.push_fragment("lo");
        let reply = turn.commit();

        assert_eq!(reply.content, "Hello");
        assert_eq!(log.len(), 2);
        assert_eq!(log.messages()[0].role, Role::User);
        assert_eq!(log.messages()[0].content, "hi");
        assert_eq!(log.messages()[1].role, Role::Assistant);
    }

    #[test]
    fn abandoned_turn_keeps_only_user_entry() {
        let mut log = SessionLog::new();
        {
            let mut turn = log.begin_turn("hi");
            turn.push_fragment("partial");
        }
        assert_eq!(log.len(), 1);
        assert_eq!(log.messages()[0].role, Role::User);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut log = SessionLog::new();
        for prompt in ["one", "two", "three"] {
            log.begin_turn(prompt).commit();
        }
        let tail = log.recent(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].role, Role::Assistant);
        assert_eq!(tail[1].content, "three");
        assert_eq!(log.recent(100).len(), 6);
    }

    #[test]
    fn stamped_puts_time_header_before_content() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: "Hello".to_string(),
            timestamp: Utc::now().timestamp(),
        };
        let text = msg.stamped();
        let (header, body) = text.split_once(":\n\n").unwrap();
        assert_eq!(header.len(), "2024-01-01 12:00".len());
        assert_eq!(body, "Hello");
    }

    #[test]
    fn history_block_labels_roles() {
        let mut log = SessionLog::new();
        let mut turn = log.begin_turn("What is up?");
        turn.push_fragment("Not much.");
        turn.commit();

        let block = format_history_for_prompt(log.messages());
        assert_eq!(block, "Previous conversation:\nUser: What is up?\nAssistant: Not much.\n");
        assert!(format_history_for_prompt(&[]).is_empty());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::new(Role::Assistant, "x");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        let mode: ChatMode = serde_json::from_str("\"document\"").unwrap();
        assert_eq!(mode, ChatMode::Document);
    }
}
