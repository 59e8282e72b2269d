use serde::{Deserialize, Serialize};

use crate::error::VibeError;
use crate::utils::distance_label;

/// Coarse last-seen indicator reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    #[serde(rename = "now")]
    Now,
    #[serde(rename = "5min")]
    FiveMin,
    // 未知状态一律视为离开
    #[serde(rename = "away", other)]
    Away,
}

/// One row of a proximity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyUser {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(rename = "approx_distance_m")]
    pub approx_distance_meters: f64,
    #[serde(default = "default_presence")]
    pub presence: Presence,
}

fn default_presence() -> Presence {
    Presence::Away
}

impl NearbyUser {
    pub fn distance_label(&self) -> String {
        distance_label(self.approx_distance_meters.max(0.0))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    // 为空的字段不参与 upsert，避免覆盖已有数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// 预设的状态
pub const VIBE_STATUSES: [&str; 6] = [
    "😊 Open to chat",
    "☕ Coffee time",
    "📚 Study buddy",
    "🚶 Taking a walk",
    "💼 Work break",
    "🎵 Music lover",
];

/// Returns the trimmed name when it is 3-20 characters long.
pub fn validate_name(name: &str) -> Result<String, VibeError> {
    let name = name.trim();
    let len = name.chars().count();
    if !(3..=20).contains(&len) {
        return Err(VibeError::Validation("Name must be 3-20 characters".into()));
    }
    Ok(name.to_string())
}

/// Presets are accepted verbatim, custom statuses are trimmed and must not be empty.
pub fn validate_status(status: &str) -> Result<String, VibeError> {
    if VIBE_STATUSES.contains(&status) {
        return Ok(status.to_string());
    }
    let status = status.trim();
    if status.is_empty() {
        return Err(VibeError::Validation("Status must not be empty".into()));
    }
    Ok(status.to_string())
}
