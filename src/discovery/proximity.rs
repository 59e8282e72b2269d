use std::sync::Arc;

use crate::backend::DiscoveryApi;
use crate::common::GeoPoint;
use crate::error::VibeError;
use crate::models::NearbyUser;

pub struct ProximityClient {
    api: Arc<dyn DiscoveryApi>,
    self_id: String,
    radius_meters: f64,
}

impl ProximityClient {
    pub fn new(api: Arc<dyn DiscoveryApi>, self_id: impl Into<String>, radius_meters: f64) -> Self {
        Self {
            api,
            self_id: self_id.into(),
            radius_meters,
        }
    }

    /// Nearby users, never including the local user.
    pub async fn query_nearby(&self, point: GeoPoint) -> Result<Vec<NearbyUser>, VibeError> {
        let users = self
            .api
            .get_nearby_users(point, self.radius_meters)
            .await
            .map_err(|e| match e {
                VibeError::QueryFailed(_) => e,
                other => VibeError::QueryFailed(other.reason()),
            })?;

        // 后端不一定会排除自己
        Ok(users
            .into_iter()
            .filter(|u| u.user_id != self.self_id)
            .collect())
    }
}
