use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use backend::{DiscoveryApi, SocialApi};
use chat::ChatSession;
use config::Config;
use discovery::{
    Coordinator, DiscoveryDeps, DiscoverySettings, DiscoverySnapshot, LocationSource, Navigation,
    VibeFeed,
};
use error::VibeError;
use realtime::RealtimeClient;
use session::Session;

pub mod backend;
pub mod chat;
pub mod common;
pub mod config;
pub mod discovery;
pub mod error;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod result;
pub mod router;
pub mod session;
pub mod utils;

pub mod routes;

/// Backend capabilities shared by every view.
#[derive(Clone)]
pub struct Services {
    pub discovery: Arc<dyn DiscoveryApi>,
    pub social: Arc<dyn SocialApi>,
    pub feed: Arc<dyn VibeFeed>,
    pub location: Arc<dyn LocationSource>,
    pub realtime: Option<RealtimeClient>,
}

/// View state that outlives a single request.
#[derive(Default)]
pub struct Views {
    coordinator: Mutex<Option<Arc<Coordinator>>>,
    chats: Mutex<HashMap<String, Arc<Mutex<ChatSession>>>>,
    last_navigation: Mutex<Option<Navigation>>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub services: Services,
    pub session: Option<Session>,
    pub views: Arc<Views>,
}

impl AppState {
    pub fn new(config: Config, services: Services, session: Option<Session>) -> Self {
        Self {
            config,
            services,
            session,
            views: Arc::new(Views::default()),
        }
    }

    fn user_id(&self) -> Result<&str, VibeError> {
        self.session
            .as_ref()
            .map(|s| s.user_id.as_str())
            .ok_or(VibeError::Unauthenticated)
    }

    /// The running coordinator, mounting a new one when there is none.
    pub async fn discovery(&self) -> Result<Arc<Coordinator>, VibeError> {
        let user_id = self.user_id()?.to_string();
        let mut slot = self.views.coordinator.lock().await;
        if let Some(coordinator) = slot.as_ref() {
            return Ok(Arc::clone(coordinator));
        }

        let deps = DiscoveryDeps {
            api: Arc::clone(&self.services.discovery),
            feed: Arc::clone(&self.services.feed),
            location: Arc::clone(&self.services.location),
            user_id,
        };
        let (coordinator, mut navigations) =
            Coordinator::start(deps, DiscoverySettings::from(&self.config));
        let coordinator = Arc::new(coordinator);
        *slot = Some(Arc::clone(&coordinator));

        let state = self.clone();
        tokio::spawn(async move {
            if let Some(navigation) = navigations.recv().await {
                state.follow(navigation).await;
            }
        });

        Ok(coordinator)
    }

    pub async fn discovery_snapshot(&self) -> Result<DiscoverySnapshot, VibeError> {
        Ok(self.discovery().await?.snapshot())
    }

    // 跳转到聊天：记录目标，卸载发现页，打开会话
    async fn follow(&self, navigation: Navigation) {
        info!("Following navigation to {}", navigation.path());
        if let Some(coordinator) = self.views.coordinator.lock().await.take() {
            coordinator.dispose();
        }
        *self.views.last_navigation.lock().await = Some(navigation.clone());

        if let Err(e) = self.chat(&navigation.conversation_id).await {
            warn!("Failed to open chat {}: {}", navigation.conversation_id, e);
        }
    }

    pub async fn last_navigation(&self) -> Option<Navigation> {
        self.views.last_navigation.lock().await.clone()
    }

    /// The open session for `conversation_id`, opening it if needed.
    pub async fn chat(&self, conversation_id: &str) -> Result<Arc<Mutex<ChatSession>>, VibeError> {
        let user_id = self.user_id()?;
        if let Some(session) = self.views.chats.lock().await.get(conversation_id) {
            return Ok(Arc::clone(session));
        }

        // 加载历史时不持有锁，其它会话的请求不用等待
        let opened = ChatSession::open(
            conversation_id,
            Arc::clone(&self.services.social),
            self.services.realtime.as_ref(),
            user_id,
        )
        .await?;

        // 并发打开时保留先到的会话，多余的随 drop 关闭
        let mut chats = self.views.chats.lock().await;
        let session = chats
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(opened)));
        Ok(Arc::clone(session))
    }

    /// Returns false when the chat was not open.
    pub async fn close_chat(&self, conversation_id: &str) -> bool {
        let removed = self.views.chats.lock().await.remove(conversation_id);
        match removed {
            Some(session) => {
                session.lock().await.close();
                true
            }
            None => false,
        }
    }
}
