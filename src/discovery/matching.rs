use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::DiscoveryApi;
use crate::error::VibeError;
use crate::models::VibeSignal;

/// Live vibe events plus the means to stop them.
pub struct VibeSubscription {
    pub events: mpsc::UnboundedReceiver<VibeSignal>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl VibeSubscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<VibeSignal>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
        self.events.close();
    }
}

impl Drop for VibeSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Push channel of vibe inserts. Delivery is at-least-once and unfiltered.
#[async_trait]
pub trait VibeFeed: Send + Sync {
    async fn subscribe_vibes(&self, user_id: &str) -> Result<VibeSubscription, VibeError>;
}

/// Turns vibe events that involve the local user into resolved conversation ids.
pub struct MatchListener {
    task: Option<JoinHandle<()>>,
}

impl MatchListener {
    pub fn spawn<F>(
        feed: Arc<dyn VibeFeed>,
        api: Arc<dyn DiscoveryApi>,
        self_id: String,
        on_match: F,
    ) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let on_match = Arc::new(on_match);
        let task = tokio::spawn(async move {
            let mut subscription = match feed.subscribe_vibes(&self_id).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!("Vibe subscription failed: {}, relying on periodic refresh", e);
                    return;
                }
            };
            info!("Listening for vibes involving {}", self_id);

            while let Some(signal) = subscription.events.recv().await {
                let Some(other) = signal.counterpart_of(&self_id) else {
                    continue;
                };
                let other = other.to_string();
                let api = Arc::clone(&api);
                let on_match = Arc::clone(&on_match);

                // 每个事件独立解析，不阻塞后续事件的接收
                tokio::spawn(async move {
                    match api.get_conversation_with(&other).await {
                        Ok(Some(conversation_id)) => on_match(conversation_id),
                        Ok(None) => debug!("Vibe with {} is not mutual yet", other),
                        Err(e) => warn!("{}; waiting for the next vibe event", e),
                    }
                });
            }
            debug!("Vibe subscription ended");
        });

        Self { task: Some(task) }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Aborting the task drops the subscription, which unsubscribes.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for MatchListener {
    fn drop(&mut self) {
        self.stop();
    }
}
