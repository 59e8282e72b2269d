use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, warn};

use crate::backend::DiscoveryApi;
use crate::common::GeoPoint;

/// Best-effort liveness and location announcements. Never fails the caller.
pub struct PresencePublisher {
    api: Arc<dyn DiscoveryApi>,
    user_id: String,
}

impl PresencePublisher {
    pub fn new(api: Arc<dyn DiscoveryApi>, user_id: impl Into<String>) -> Self {
        Self {
            api,
            user_id: user_id.into(),
        }
    }

    /// Overwrites the stored location, then marks the user as seen now.
    pub async fn announce(&self, point: GeoPoint) {
        match self.api.update_my_location(point).await {
            Ok(()) => debug!("Location updated to ({}, {})", point.lat, point.lon),
            Err(e) => warn!("Failed to update location for {}: {}", self.user_id, e),
        }
        self.heartbeat().await;
    }

    pub async fn heartbeat(&self) {
        if let Err(e) = self.api.touch_presence(&self.user_id).await {
            warn!("Failed to publish presence for {}: {}", self.user_id, e);
        }
    }

    /// Heartbeat every `period`, first one after a full period.
    pub fn spawn_heartbeat(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let publisher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                publisher.heartbeat().await;
            }
        })
    }
}
