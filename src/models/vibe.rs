use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A one-directional "interested" signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibeSignal {
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl VibeSignal {
    pub fn new(sender_id: impl Into<String>, receiver_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            created_at: Utc::now(),
        }
    }

    /// The other party when `user_id` is sender or receiver.
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if self.sender_id == user_id {
            Some(&self.receiver_id)
        } else if self.receiver_id == user_id {
            Some(&self.sender_id)
        } else {
            None
        }
    }
}
