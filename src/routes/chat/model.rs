use serde::{Deserialize, Serialize};

use crate::chat::ChatSession;
use crate::models::ChatMessage;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatView {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
    pub others_typing: bool,
    /// 实时推送中断的原因
    pub paused: Option<String>,
}

impl From<&ChatSession> for ChatView {
    fn from(session: &ChatSession) -> Self {
        Self {
            conversation_id: session.conversation_id().to_string(),
            messages: session.messages(),
            others_typing: session.others_typing(),
            paused: session.last_error().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct TypingRequest {
    pub typing: bool,
}
