//! One open conversation: history, live inserts, sending and typing.

mod typing;

pub use typing::TypingPresence;

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::SocialApi;
use crate::error::VibeError;
use crate::models::{ChatMessage, NewMessage};
use crate::realtime::{ChannelConfig, ChannelEvent, PostgresChangeFilter, RealtimeClient};

pub const IMAGE_BUCKET: &str = "message_images";

#[derive(Default)]
struct Transcript {
    messages: Vec<ChatMessage>,
    last_error: Option<VibeError>,
}

impl Transcript {
    // 按 id 去重，推送和重新加载可能重复
    fn push(&mut self, message: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

pub struct ChatSession {
    conversation_id: String,
    user_id: String,
    api: Arc<dyn SocialApi>,
    transcript: Arc<Mutex<Transcript>>,
    live: Option<JoinHandle<()>>,
    typing: Option<TypingPresence>,
}

impl ChatSession {
    /// Loads the history and, when a realtime client is given, follows new
    /// messages and joins the typing channel.
    pub async fn open(
        conversation_id: &str,
        api: Arc<dyn SocialApi>,
        realtime: Option<&RealtimeClient>,
        user_id: &str,
    ) -> Result<Self, VibeError> {
        let history = api.list_messages(conversation_id).await?;
        info!(
            "Opened chat {} with {} messages",
            conversation_id,
            history.len()
        );

        let transcript = Arc::new(Mutex::new(Transcript::default()));
        if let Ok(mut t) = transcript.lock() {
            for message in history {
                t.push(message);
            }
        }

        let (live, typing) = match realtime {
            Some(client) => (
                Some(follow_messages(client, conversation_id, Arc::clone(&transcript))),
                Some(TypingPresence::join(client, conversation_id, user_id)),
            ),
            None => (None, None),
        };

        Ok(Self {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            api,
            transcript,
            live,
            typing,
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.transcript
            .lock()
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }

    /// Why the chat is paused: the live feed dropped or the last send failed.
    pub fn last_error(&self) -> Option<VibeError> {
        self.transcript.lock().ok().and_then(|t| t.last_error.clone())
    }

    pub async fn send_text(&mut self, content: &str) -> Result<(), VibeError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(VibeError::Validation("Message is empty".to_string()));
        }

        let message = NewMessage::text(&self.conversation_id, &self.user_id, content.to_string());
        let sent = self.api.insert_message(&message).await;
        self.settle(sent)?;
        self.set_typing(false);
        self.sync_without_live().await
    }

    /// Uploads the image, then posts a message pointing at its public URL.
    pub async fn send_image(&mut self, bytes: Vec<u8>, content_type: &str) -> Result<(), VibeError> {
        if bytes.is_empty() {
            return Err(VibeError::Validation("Image is empty".to_string()));
        }

        let key = format!(
            "{}/{}-{}.jpg",
            self.conversation_id,
            Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4()
        );
        let uploaded = self
            .api
            .upload_object(IMAGE_BUCKET, &key, bytes, content_type)
            .await;
        let url = self.settle(uploaded)?;
        debug!("Uploaded chat image to {}", url);

        let message = NewMessage::image(&self.conversation_id, &self.user_id, url);
        let sent = self.api.insert_message(&message).await;
        self.settle(sent)?;
        self.sync_without_live().await
    }

    // 发送失败时显示暂停提示，下一次成功后清除
    fn settle<T>(&self, result: Result<T, VibeError>) -> Result<T, VibeError> {
        if let Ok(mut t) = self.transcript.lock() {
            match &result {
                Ok(_) => t.last_error = None,
                Err(e) => {
                    warn!("Chat {} send failed: {}", self.conversation_id, e);
                    t.last_error = Some(e.clone());
                }
            }
        }
        result
    }

    pub fn set_typing(&mut self, typing: bool) {
        if let Some(presence) = self.typing.as_mut() {
            presence.set_typing(typing);
        }
    }

    pub fn others_typing(&self) -> bool {
        self.typing.as_ref().is_some_and(|t| t.others_typing())
    }

    /// Stops following the conversation and releases typing presence.
    pub fn close(&mut self) {
        if let Some(live) = self.live.take() {
            live.abort();
        }
        if let Some(mut typing) = self.typing.take() {
            typing.release();
        }
        debug!("Closed chat {}", self.conversation_id);
    }

    // 没有实时推送时重新拉取
    async fn sync_without_live(&self) -> Result<(), VibeError> {
        if self.live.is_some() {
            return Ok(());
        }
        let latest = self.api.list_messages(&self.conversation_id).await?;
        if let Ok(mut t) = self.transcript.lock() {
            for message in latest {
                t.push(message);
            }
        }
        Ok(())
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn follow_messages(
    client: &RealtimeClient,
    conversation_id: &str,
    transcript: Arc<Mutex<Transcript>>,
) -> JoinHandle<()> {
    let (channel, mut events) = client.channel(
        &format!("chat:{conversation_id}"),
        ChannelConfig::changes(vec![
            PostgresChangeFilter::inserts("messages")
                .with_filter(format!("conversation_id=eq.{conversation_id}")),
        ]),
    );

    tokio::spawn(async move {
        // 任务结束时 channel 随之释放
        let _channel = channel;
        while let Some(event) = events.recv().await {
            let Ok(mut t) = transcript.lock() else {
                break;
            };
            match event {
                ChannelEvent::Subscribed => t.last_error = None,
                ChannelEvent::Disconnected(e) => {
                    warn!("Chat feed paused: {}", e);
                    t.last_error = Some(e);
                }
                ChannelEvent::Change { table, record, .. } if table == "messages" => {
                    match serde_json::from_value::<ChatMessage>(record) {
                        Ok(message) => {
                            t.push(message);
                        }
                        Err(e) => warn!("Malformed message record: {}", e),
                    }
                }
                _ => {}
            }
        }
    })
}
