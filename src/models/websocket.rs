use serde::{ Serialize, Deserialize };

use super::chat::{ ChatMessage, ChatMode };

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
        #[serde(default)]
        mode: Option<ChatMode>,
    },
    #[serde(rename = "clear")]
    Clear,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session")] Session {
        id: String,
    },
    #[serde(rename = "history")] History {
        messages: Vec<ChatMessage>,
    },
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "partial")] Partial {
        content: String,
    },
    #[serde(rename = "done")] Done {
        timestamp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        eval_count: Option<u64>,
    },
    #[serde(rename = "cleared")]
    Cleared,
    #[serde(rename = "error")] Error {
        message: String,
    },
}
