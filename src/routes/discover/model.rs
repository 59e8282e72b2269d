use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::GeoPoint;
use crate::discovery::{DiscoverySnapshot, Phase};
use crate::models::{NearbyUser, Presence};

/// 附近用户卡片，只暴露粗略距离
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCard {
    pub user_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub presence: Presence,
    pub distance_label: String,
}

impl From<&NearbyUser> for UserCard {
    fn from(user: &NearbyUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
            presence: user.presence,
            distance_label: user.distance_label(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoverView {
    pub phase: String,
    pub loading: bool,
    pub refreshing: bool,
    pub center: Option<GeoPoint>,
    pub radius_meters: f64,
    pub map_tile_url: String,
    pub users: Vec<UserCard>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub signal_error: Option<String>,
    /// Set once a mutual match has been found.
    pub match_conversation_id: Option<String>,
}

impl DiscoverView {
    pub fn new(snapshot: &DiscoverySnapshot, radius_meters: f64, map_tile_url: &str) -> Self {
        let match_conversation_id = match &snapshot.phase {
            Phase::MatchPending { conversation_id } | Phase::Navigating { conversation_id } => {
                Some(conversation_id.clone())
            }
            _ => None,
        };

        Self {
            phase: snapshot.phase.name().to_string(),
            loading: snapshot.loading,
            refreshing: snapshot.refresh.in_flight,
            center: snapshot.center,
            radius_meters,
            map_tile_url: map_tile_url.to_string(),
            users: snapshot.users.iter().map(UserCard::from).collect(),
            last_refreshed_at: snapshot.refresh.last_completed_at,
            error: snapshot.refresh.last_error.as_ref().map(|e| e.to_string()),
            signal_error: snapshot.signal_error.as_ref().map(|e| e.to_string()),
            match_conversation_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VibeRequest {
    pub target_id: String,
}
