use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::common::GeoPoint;
use crate::error::VibeError;

/// How the daemon obtains the device position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationMode {
    Fixed,
    Ip,
    Off,
}

impl FromStr for LocationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(LocationMode::Fixed),
            "ip" => Ok(LocationMode::Ip),
            "off" => Ok(LocationMode::Off),
            other => Err(format!("unknown location mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub access_token: Option<String>,
    pub jwt_secret: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub discovery_radius: f64,
    pub refresh_interval_secs: u64,
    pub presence_interval_secs: u64,
    pub match_celebration_ms: u64,
    pub location_timeout_ms: u64,
    pub location_max_age_ms: u64,
    pub location_mode: LocationMode,
    pub fixed_location: Option<GeoPoint>,
    pub geoip_url: String,
    pub map_tile_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, VibeError> {
        dotenv::dotenv().ok();

        let fixed_location = match (optional("VIBE_LATITUDE"), optional("VIBE_LONGITUDE")) {
            (Some(lat), Some(lon)) => match (lat.parse::<f64>(), lon.parse::<f64>()) {
                (Ok(lat), Ok(lon)) => Some(GeoPoint::new(lat, lon)),
                _ => {
                    warn!("Invalid VIBE_LATITUDE/VIBE_LONGITUDE, no fixed location");
                    None
                }
            },
            _ => None,
        };

        Ok(Config {
            supabase_url: required("SUPABASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            supabase_anon_key: required("SUPABASE_ANON_KEY")?,
            access_token: optional("VIBE_ACCESS_TOKEN"),
            jwt_secret: optional("SUPABASE_JWT_SECRET"),
            server_host: try_load("SERVER_HOST", "127.0.0.1"),
            server_port: try_load("SERVER_PORT", "3000"),
            discovery_radius: try_load("DISCOVERY_RADIUS", "500"),
            refresh_interval_secs: try_load("REFRESH_INTERVAL_SECS", "20"),
            presence_interval_secs: try_load("PRESENCE_INTERVAL_SECS", "20"),
            match_celebration_ms: try_load("MATCH_CELEBRATION_MS", "800"),
            location_timeout_ms: try_load("LOCATION_TIMEOUT_MS", "15000"),
            location_max_age_ms: try_load("LOCATION_MAX_AGE_MS", "15000"),
            location_mode: try_load("LOCATION_MODE", "fixed"),
            fixed_location,
            geoip_url: try_load("GEOIP_URL", "https://ipapi.co/json/"),
            map_tile_url: try_load(
                "MAP_TILE_URL",
                "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            ),
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_secs(self.presence_interval_secs)
    }

    pub fn match_celebration(&self) -> Duration {
        Duration::from_millis(self.match_celebration_ms)
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }

    pub fn location_max_age(&self) -> Duration {
        Duration::from_millis(self.location_max_age_ms)
    }
}

fn required(key: &str) -> Result<String, VibeError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| VibeError::Config(format!("{key} is not set")))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    parse_or_default(key, &raw, default)
}

fn parse_or_default<T: FromStr>(key: &str, raw: &str, default: &str) -> T
where
    T::Err: Display,
{
    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
            match default.parse() {
                Ok(value) => value,
                Err(_) => unreachable!("default for {key} must parse"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_numbers_fall_back_to_default() {
        let radius: f64 = parse_or_default("DISCOVERY_RADIUS", "far", "500");
        assert_eq!(radius, 500.0);
        let port: u16 = parse_or_default("SERVER_PORT", "8080", "3000");
        assert_eq!(port, 8080);
    }

    #[test]
    fn parses_location_modes() {
        assert_eq!("IP".parse::<LocationMode>(), Ok(LocationMode::Ip));
        assert_eq!(" off ".parse::<LocationMode>(), Ok(LocationMode::Off));
        assert!("gps".parse::<LocationMode>().is_err());
    }
}
