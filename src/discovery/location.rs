use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::common::GeoPoint;
use crate::config::{Config, LocationMode};
use crate::error::VibeError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationConstraints {
    /// How long a single fix may take before failing with `Timeout`.
    pub timeout: Duration,
    /// Poll period of a watch.
    pub maximum_age: Duration,
}

impl Default for LocationConstraints {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            maximum_age: Duration::from_secs(15),
        }
    }
}

impl From<&Config> for LocationConstraints {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.location_timeout(),
            maximum_age: config.location_max_age(),
        }
    }
}

#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn current_location(&self) -> Result<GeoPoint, VibeError>;
}

/// Single-shot fix bounded by `constraints.timeout`.
pub async fn locate(
    source: &dyn LocationSource,
    constraints: &LocationConstraints,
) -> Result<GeoPoint, VibeError> {
    match timeout(constraints.timeout, source.current_location()).await {
        Ok(result) => result,
        Err(_) => Err(VibeError::Timeout),
    }
}

/// Disposable handle of a running watch.
pub struct WatchHandle {
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops further callbacks. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Polls `source` every `maximum_age` and calls `on_update` whenever the fix changes.
pub fn watch_location<F>(
    source: Arc<dyn LocationSource>,
    constraints: LocationConstraints,
    on_update: F,
) -> WatchHandle
where
    F: Fn(GeoPoint) + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut last: Option<GeoPoint> = None;
        loop {
            match locate(source.as_ref(), &constraints).await {
                Ok(point) if last != Some(point) => {
                    last = Some(point);
                    on_update(point);
                }
                Ok(_) => {}
                // 单次失败不终止监听
                Err(e) => debug!("Location watch fix failed: {}", e),
            }
            sleep(constraints.maximum_age).await;
        }
    });

    WatchHandle { task: Some(task) }
}

/// Position taken from configuration.
pub struct FixedLocation {
    point: Option<GeoPoint>,
}

impl FixedLocation {
    pub fn new(point: Option<GeoPoint>) -> Self {
        Self { point }
    }
}

#[async_trait]
impl LocationSource for FixedLocation {
    async fn current_location(&self) -> Result<GeoPoint, VibeError> {
        self.point.ok_or(VibeError::LocationUnavailable)
    }
}

/// The user opted out of sharing a position.
pub struct DisabledLocation;

#[async_trait]
impl LocationSource for DisabledLocation {
    async fn current_location(&self) -> Result<GeoPoint, VibeError> {
        Err(VibeError::PermissionDenied)
    }
}

#[derive(Deserialize)]
struct GeoIpResponse {
    #[serde(alias = "lat")]
    latitude: Option<f64>,
    #[serde(alias = "lon")]
    longitude: Option<f64>,
}

/// Approximate position from an IP geolocation service.
pub struct IpLocation {
    http: reqwest::Client,
    url: String,
}

impl IpLocation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl LocationSource for IpLocation {
    async fn current_location(&self) -> Result<GeoPoint, VibeError> {
        let response = self.http.get(&self.url).send().await.map_err(|e| {
            debug!("Geo IP lookup failed: {}", e);
            VibeError::LocationUnavailable
        })?;
        let body: GeoIpResponse = response.json().await.map_err(|e| {
            debug!("Geo IP response undecodable: {}", e);
            VibeError::LocationUnavailable
        })?;

        match (body.latitude, body.longitude) {
            (Some(lat), Some(lon)) => Ok(GeoPoint::new(lat, lon)),
            _ => Err(VibeError::LocationUnavailable),
        }
    }
}

pub fn source_from_config(config: &Config) -> Arc<dyn LocationSource> {
    match config.location_mode {
        LocationMode::Fixed => Arc::new(FixedLocation::new(config.fixed_location)),
        LocationMode::Ip => Arc::new(IpLocation::new(config.geoip_url.clone())),
        LocationMode::Off => Arc::new(DisabledLocation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stalled;

    #[async_trait]
    impl LocationSource for Stalled {
        async fn current_location(&self) -> Result<GeoPoint, VibeError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(GeoPoint::new(0.0, 0.0))
        }
    }

    /// Walks through a fixed list of points, then repeats the last one.
    struct Walk {
        points: Vec<GeoPoint>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LocationSource for Walk {
        async fn current_location(&self) -> Result<GeoPoint, VibeError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.points[i.min(self.points.len() - 1)])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fix_times_out() {
        let constraints = LocationConstraints {
            timeout: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(locate(&Stalled, &constraints).await, Err(VibeError::Timeout));
    }

    #[tokio::test]
    async fn fixed_and_disabled_sources() {
        let constraints = LocationConstraints::default();
        assert_eq!(
            locate(&FixedLocation::new(None), &constraints).await,
            Err(VibeError::LocationUnavailable)
        );
        assert_eq!(
            locate(&DisabledLocation, &constraints).await,
            Err(VibeError::PermissionDenied)
        );
        let p = GeoPoint::new(31.23, 121.47);
        assert_eq!(locate(&FixedLocation::new(Some(p)), &constraints).await, Ok(p));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_reports_changes_until_cancelled() {
        let a = GeoPoint::new(1.0, 1.0);
        let b = GeoPoint::new(2.0, 2.0);
        let source = Arc::new(Walk {
            points: vec![a, a, b, b],
            calls: AtomicUsize::new(0),
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let constraints = LocationConstraints {
            timeout: Duration::from_secs(1),
            maximum_age: Duration::from_secs(10),
        };

        let mut handle = watch_location(source.clone(), constraints, move |p| {
            sink.lock().unwrap().push(p)
        });
        sleep(Duration::from_secs(35)).await;
        assert_eq!(*seen.lock().unwrap(), vec![a, b]);
        assert!(handle.is_active());

        handle.cancel();
        handle.cancel();
        let calls = source.calls.load(Ordering::SeqCst);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
        assert!(!handle.is_active());
    }
}
