#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use vibe::backend::{BackendHealth, DiscoveryApi, SocialApi};
use vibe::common::GeoPoint;
use vibe::config::{Config, LocationMode};
use vibe::discovery::{LocationSource, VibeFeed, VibeSubscription};
use vibe::error::VibeError;
use vibe::models::{
    ChatMessage, ConversationSummary, NearbyUser, NewMessage, Presence, Profile,
    VibeSignal,
};

pub const SELF_ID: &str = "me";

pub fn user(id: &str, meters: f64) -> NearbyUser {
    NearbyUser {
        user_id: id.to_string(),
        name: format!("user {id}"),
        avatar_url: None,
        approx_distance_meters: meters,
        presence: Presence::Now,
    }
}

/// In-memory backend with call counters.
pub struct FakeApi {
    nearby: Mutex<Result<Vec<NearbyUser>, VibeError>>,
    query_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub queries: AtomicUsize,
    pub location_updates: AtomicUsize,
    pub presence_touches: AtomicUsize,
    pub vibes_sent: Mutex<Vec<String>>,
    vibe_error: Mutex<Option<VibeError>>,
    conversations: Mutex<HashMap<String, String>>,
    pub profiles: Mutex<HashMap<String, Profile>>,
    messages: Mutex<Vec<(String, ChatMessage)>>,
    pub uploads: Mutex<Vec<String>>,
    healthy: AtomicBool,
    presence_failing: AtomicBool,
    resolution_failures: AtomicUsize,
    pub resolutions: AtomicUsize,
    inserts_failing: AtomicBool,
    history_delay: Mutex<Duration>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            nearby: Mutex::new(Ok(Vec::new())),
            query_delay: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            location_updates: AtomicUsize::new(0),
            presence_touches: AtomicUsize::new(0),
            vibes_sent: Mutex::new(Vec::new()),
            vibe_error: Mutex::new(None),
            conversations: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
            messages: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            presence_failing: AtomicBool::new(false),
            resolution_failures: AtomicUsize::new(0),
            resolutions: AtomicUsize::new(0),
            inserts_failing: AtomicBool::new(false),
            history_delay: Mutex::new(Duration::ZERO),
        }
    }
}

impl FakeApi {
    pub fn set_nearby(&self, users: Vec<NearbyUser>) {
        *self.nearby.lock().unwrap() = Ok(users);
    }

    pub fn fail_nearby(&self, error: VibeError) {
        *self.nearby.lock().unwrap() = Err(error);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = delay;
    }

    pub fn fail_vibes(&self, error: VibeError) {
        *self.vibe_error.lock().unwrap() = Some(error);
    }

    pub fn clear_vibe_failure(&self) {
        *self.vibe_error.lock().unwrap() = None;
    }

    /// Makes the interest with `other` mutual.
    pub fn add_conversation(&self, other: &str, conversation_id: &str) {
        self.conversations
            .lock()
            .unwrap()
            .insert(other.to_string(), conversation_id.to_string());
    }

    /// Location updates and presence touches fail while set.
    pub fn fail_presence(&self, failing: bool) {
        self.presence_failing.store(failing, Ordering::SeqCst);
    }

    /// The next `count` conversation lookups fail.
    pub fn fail_next_resolutions(&self, count: usize) {
        self.resolution_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, failing: bool) {
        self.inserts_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_history_delay(&self, delay: Duration) {
        *self.history_delay.lock().unwrap() = delay;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryApi for FakeApi {
    async fn get_nearby_users(
        &self,
        _point: GeoPoint,
        _radius_meters: f64,
    ) -> Result<Vec<NearbyUser>, VibeError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.query_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.nearby.lock().unwrap().clone()
    }

    async fn update_my_location(&self, _point: GeoPoint) -> Result<(), VibeError> {
        self.location_updates.fetch_add(1, Ordering::SeqCst);
        if self.presence_failing.load(Ordering::SeqCst) {
            return Err(VibeError::Backend("presence down".to_string()));
        }
        Ok(())
    }

    async fn touch_presence(&self, _user_id: &str) -> Result<(), VibeError> {
        self.presence_touches.fetch_add(1, Ordering::SeqCst);
        if self.presence_failing.load(Ordering::SeqCst) {
            return Err(VibeError::Backend("presence down".to_string()));
        }
        Ok(())
    }

    async fn send_vibe(&self, target_id: &str) -> Result<(), VibeError> {
        if let Some(error) = self.vibe_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.vibes_sent.lock().unwrap().push(target_id.to_string());
        Ok(())
    }

    async fn get_conversation_with(&self, target_id: &str) -> Result<Option<String>, VibeError> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .resolution_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(VibeError::ConversationResolutionFailed("timeout".to_string()));
        }
        Ok(self.conversations.lock().unwrap().get(target_id).cloned())
    }
}

#[async_trait]
impl SocialApi for FakeApi {
    async fn health(&self) -> BackendHealth {
        if self.healthy.load(Ordering::SeqCst) {
            BackendHealth {
                connected: true,
                error: None,
            }
        } else {
            BackendHealth {
                connected: false,
                error: Some("connection refused".to_string()),
            }
        }
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<Profile>, VibeError> {
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }

    async fn save_profile(&self, profile: &Profile) -> Result<(), VibeError> {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, VibeError> {
        let conversations = self.conversations.lock().unwrap();
        Ok(conversations
            .values()
            .map(|id| ConversationSummary {
                id: id.clone(),
                title: "Chat".to_string(),
                last_message: None,
            })
            .collect())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, VibeError> {
        let delay = *self.history_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == conversation_id)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<(), VibeError> {
        if self.inserts_failing.load(Ordering::SeqCst) {
            return Err(VibeError::Backend("insert rejected".to_string()));
        }
        let mut messages = self.messages.lock().unwrap();
        let stored = ChatMessage {
            id: format!("m{}", messages.len() + 1),
            sender_id: message.sender_id.clone(),
            kind: message.kind,
            content: message.content.clone(),
            image_url: message.image_url.clone(),
            created_at: Utc::now(),
        };
        messages.push((message.conversation_id.clone(), stored));
        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, VibeError> {
        self.uploads.lock().unwrap().push(format!("{bucket}/{key}"));
        Ok(format!("https://storage.test/{bucket}/{key}"))
    }
}

/// Vibe feed driven by the test.
#[derive(Default)]
pub struct FakeFeed {
    senders: Mutex<Vec<mpsc::UnboundedSender<VibeSignal>>>,
    pub subscriptions: AtomicUsize,
    pub unsubscribed: Arc<AtomicUsize>,
}

impl FakeFeed {
    pub fn emit(&self, signal: VibeSignal) {
        self.senders
            .lock()
            .unwrap()
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }

    pub fn unsubscribed(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VibeFeed for FakeFeed {
    async fn subscribe_vibes(&self, _user_id: &str) -> Result<VibeSubscription, VibeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);

        let unsubscribed = Arc::clone(&self.unsubscribed);
        Ok(VibeSubscription::new(rx, move || {
            unsubscribed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

pub struct FakeLocation(pub Result<GeoPoint, VibeError>);

impl FakeLocation {
    pub fn at(lat: f64, lon: f64) -> Self {
        Self(Ok(GeoPoint::new(lat, lon)))
    }
}

#[async_trait]
impl LocationSource for FakeLocation {
    async fn current_location(&self) -> Result<GeoPoint, VibeError> {
        self.0.clone()
    }
}

pub fn test_config() -> Config {
    Config {
        supabase_url: "http://backend.test".to_string(),
        supabase_anon_key: "anon".to_string(),
        access_token: None,
        jwt_secret: None,
        server_host: "127.0.0.1".to_string(),
        server_port: 3000,
        discovery_radius: 500.0,
        refresh_interval_secs: 20,
        presence_interval_secs: 20,
        match_celebration_ms: 800,
        location_timeout_ms: 15_000,
        location_max_age_ms: 15_000,
        location_mode: LocationMode::Fixed,
        fixed_location: Some(GeoPoint::new(31.23, 121.47)),
        geoip_url: "http://geoip.test".to_string(),
        map_tile_url: "https://tiles.test/{z}/{x}/{y}.png".to_string(),
    }
}
