use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::BackendHealth;

#[derive(Debug, Serialize)]
pub struct EnvFlags {
    pub supabase_url: bool,
    pub supabase_key: bool,
    pub map_tile_url: bool,
    pub signed_in: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub backend: BackendHealth,
    pub env_vars: EnvFlags,
}
