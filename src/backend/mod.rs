//! Capabilities consumed from the hosted backend.
//!
//! Everything that needs the backend receives one of these traits at
//! construction time; the single `SupabaseClient` instance is built by the
//! composition root in `main`.

mod supabase;

pub use supabase::SupabaseClient;

use async_trait::async_trait;
use serde::Serialize;

use crate::common::GeoPoint;
use crate::error::VibeError;
use crate::models::{ChatMessage, ConversationSummary, NearbyUser, NewMessage, Profile};

/// RPC calls used by the discovery loop.
#[async_trait]
pub trait DiscoveryApi: Send + Sync {
    /// Users within `radius_meters` of `point`. The backend may include the caller.
    async fn get_nearby_users(
        &self,
        point: GeoPoint,
        radius_meters: f64,
    ) -> Result<Vec<NearbyUser>, VibeError>;

    /// Overwrites the caller's location record.
    async fn update_my_location(&self, point: GeoPoint) -> Result<(), VibeError>;

    /// Marks the caller as seen "now".
    async fn touch_presence(&self, user_id: &str) -> Result<(), VibeError>;

    async fn send_vibe(&self, target_id: &str) -> Result<(), VibeError>;

    /// `Some` only once the backend considers the interest mutual.
    async fn get_conversation_with(&self, target_id: &str) -> Result<Option<String>, VibeError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub connected: bool,
    pub error: Option<String>,
}

/// Profile, conversation and storage calls used by the chat and profile views.
#[async_trait]
pub trait SocialApi: Send + Sync {
    async fn health(&self) -> BackendHealth;

    async fn load_profile(&self, user_id: &str) -> Result<Option<Profile>, VibeError>;

    async fn save_profile(&self, profile: &Profile) -> Result<(), VibeError>;

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, VibeError>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, VibeError>;

    async fn insert_message(&self, message: &NewMessage) -> Result<(), VibeError>;

    /// Uploads an object and returns its public URL.
    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, VibeError>;
}
