use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row inserted into the messages table.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl NewMessage {
    pub fn text(conversation_id: &str, sender_id: &str, content: String) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            kind: MessageKind::Text,
            content: Some(content),
            image_url: None,
        }
    }

    pub fn image(conversation_id: &str, sender_id: &str, image_url: String) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            kind: MessageKind::Image,
            content: None,
            image_url: Some(image_url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub last_message: Option<String>,
}
