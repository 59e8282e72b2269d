use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::realtime::{Channel, ChannelConfig, ChannelEvent, RealtimeClient};

/// Typing indicator for one conversation, keyed by user id.
///
/// Owning the handle means owning the presence entry: `release` (or drop)
/// untracks and leaves the channel, whatever path the chat view exits by.
pub struct TypingPresence {
    user_id: String,
    channel: Channel,
    present: Arc<Mutex<BTreeSet<String>>>,
    typing: bool,
    pump: Option<JoinHandle<()>>,
}

impl TypingPresence {
    pub fn join(client: &RealtimeClient, conversation_id: &str, user_id: &str) -> Self {
        let (channel, mut events) = client.channel(
            &format!("typing:{conversation_id}"),
            ChannelConfig::presence(user_id),
        );
        let present = Arc::new(Mutex::new(BTreeSet::new()));

        let sink = Arc::clone(&present);
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ChannelEvent::PresenceSync(keys) => {
                        if let Ok(mut present) = sink.lock() {
                            *present = keys;
                        }
                    }
                    // 断线后对方状态未知
                    ChannelEvent::Disconnected(_) => {
                        if let Ok(mut present) = sink.lock() {
                            present.clear();
                        }
                    }
                    _ => {}
                }
            }
        });

        Self {
            user_id: user_id.to_string(),
            channel,
            present,
            typing: false,
            pump: Some(pump),
        }
    }

    pub fn set_typing(&mut self, typing: bool) {
        if self.pump.is_none() || self.typing == typing {
            return;
        }
        self.typing = typing;
        if typing {
            self.channel.track(json!({
                "user_id": self.user_id,
                "typing": true,
            }));
        } else {
            self.channel.untrack();
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn others_typing(&self) -> bool {
        self.present
            .lock()
            .map(|keys| keys.iter().any(|k| k != &self.user_id))
            .unwrap_or(false)
    }

    /// Safe to call more than once.
    pub fn release(&mut self) {
        let Some(pump) = self.pump.take() else {
            return;
        };
        if self.typing {
            self.channel.untrack();
            self.typing = false;
        }
        self.channel.close();
        pump.abort();
        debug!("Typing presence released for {}", self.user_id);
    }
}

impl Drop for TypingPresence {
    fn drop(&mut self) {
        self.release();
    }
}
