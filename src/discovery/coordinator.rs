use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, info, warn};

use super::location::{LocationConstraints, LocationSource, WatchHandle, locate, watch_location};
use super::matching::{MatchListener, VibeFeed};
use super::presence::PresencePublisher;
use super::proximity::ProximityClient;
use crate::backend::DiscoveryApi;
use crate::common::GeoPoint;
use crate::config::Config;
use crate::error::VibeError;
use crate::models::NearbyUser;

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    Refreshing,
    /// Conversation resolved, celebration running.
    MatchPending { conversation_id: String },
    /// Navigation issued. Terminal.
    Navigating { conversation_id: String },
}

impl Phase {
    pub fn is_matched(&self) -> bool {
        matches!(self, Phase::MatchPending { .. } | Phase::Navigating { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Refreshing => "REFRESHING",
            Phase::MatchPending { .. } => "MATCH_PENDING",
            Phase::Navigating { .. } => "NAVIGATING",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshCycle {
    pub in_flight: bool,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<VibeError>,
}

/// Everything the discovery view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySnapshot {
    pub phase: Phase,
    pub users: Vec<NearbyUser>,
    pub center: Option<GeoPoint>,
    pub refresh: RefreshCycle,
    /// Last failed `send_vibe`, cleared by the next successful one.
    pub signal_error: Option<VibeError>,
    /// True until the first refresh settles.
    pub loading: bool,
}

impl Default for DiscoverySnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            users: Vec::new(),
            center: None,
            refresh: RefreshCycle::default(),
            signal_error: None,
            loading: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Mount,
    Manual,
    Timer,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefreshTrigger::Mount => "mount",
            RefreshTrigger::Manual => "manual",
            RefreshTrigger::Timer => "timer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub conversation_id: String,
}

impl Navigation {
    pub fn path(&self) -> String {
        format!("/chat/{}", self.conversation_id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiscoverySettings {
    pub radius_meters: f64,
    pub refresh_interval: Duration,
    pub presence_interval: Duration,
    pub celebration_delay: Duration,
    pub location: LocationConstraints,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            radius_meters: 500.0,
            refresh_interval: Duration::from_secs(20),
            presence_interval: Duration::from_secs(20),
            celebration_delay: Duration::from_millis(800),
            location: LocationConstraints::default(),
        }
    }
}

impl From<&Config> for DiscoverySettings {
    fn from(config: &Config) -> Self {
        Self {
            radius_meters: config.discovery_radius,
            refresh_interval: config.refresh_interval(),
            presence_interval: config.presence_interval(),
            celebration_delay: config.match_celebration(),
            location: LocationConstraints::from(config),
        }
    }
}

/// Collaborators handed to a coordinator by the composition root.
#[derive(Clone)]
pub struct DiscoveryDeps {
    pub api: Arc<dyn DiscoveryApi>,
    pub feed: Arc<dyn VibeFeed>,
    pub location: Arc<dyn LocationSource>,
    pub user_id: String,
}

struct RefreshReport {
    center: Option<GeoPoint>,
    result: Result<Vec<NearbyUser>, VibeError>,
}

enum Command {
    Refresh(RefreshTrigger),
    RefreshFinished(RefreshReport),
    Located(GeoPoint),
    Matched(String),
    CelebrationElapsed,
    SignalSettled(Result<(), VibeError>),
}

struct Held {
    ticker: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    listener: MatchListener,
    watch: WatchHandle,
}

/// Background resources of one coordinator; released at most once.
#[derive(Default)]
struct Resources(Mutex<Option<Held>>);

impl Resources {
    fn hold(&self, held: Held) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(held);
        }
    }

    fn release(&self) {
        let held = match self.0.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut held) = held {
            held.ticker.abort();
            held.heartbeat.abort();
            held.listener.stop();
            held.watch.cancel();
            debug!("Discovery resources released");
        }
    }

    fn is_held(&self) -> bool {
        self.0.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

/// Drives discovery for one view: refresh loop, presence, match detection.
///
/// All triggers go through a single actor task that owns the snapshot, so a
/// refresh can only start while none is outstanding and a refresh settling
/// after a match never leaves the match phases.
pub struct Coordinator {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<DiscoverySnapshot>,
    api: Arc<dyn DiscoveryApi>,
    resources: Arc<Resources>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Starts the loop and issues the initial (mount) refresh. The receiver
    /// yields the single navigation this coordinator may issue.
    pub fn start(
        deps: DiscoveryDeps,
        settings: DiscoverySettings,
    ) -> (Self, mpsc::UnboundedReceiver<Navigation>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(DiscoverySnapshot::default());
        let (navigation_tx, navigation_rx) = mpsc::unbounded_channel();
        let resources = Arc::new(Resources::default());

        let presence = Arc::new(PresencePublisher::new(Arc::clone(&deps.api), &deps.user_id));
        let proximity = Arc::new(ProximityClient::new(
            Arc::clone(&deps.api),
            &deps.user_id,
            settings.radius_meters,
        ));

        // 定时刷新
        let ticker = {
            let tx = command_tx.clone();
            let period = settings.refresh_interval;
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    if tx.send(Command::Refresh(RefreshTrigger::Timer)).is_err() {
                        break;
                    }
                }
            })
        };

        let heartbeat = presence.spawn_heartbeat(settings.presence_interval);

        let listener = {
            let tx = command_tx.clone();
            MatchListener::spawn(
                Arc::clone(&deps.feed),
                Arc::clone(&deps.api),
                deps.user_id.clone(),
                move |conversation_id| {
                    let _ = tx.send(Command::Matched(conversation_id));
                },
            )
        };

        let watch = {
            let tx = command_tx.clone();
            let presence = Arc::clone(&presence);
            watch_location(Arc::clone(&deps.location), settings.location, move |point| {
                let _ = tx.send(Command::Located(point));
                let presence = Arc::clone(&presence);
                tokio::spawn(async move { presence.announce(point).await });
            })
        };

        resources.hold(Held {
            ticker,
            heartbeat,
            listener,
            watch,
        });

        let actor = Actor {
            snapshot: DiscoverySnapshot::default(),
            publish: state_tx,
            commands: command_rx,
            loopback: command_tx.clone(),
            navigations: navigation_tx,
            location: deps.location,
            proximity,
            presence,
            settings,
            resources: Arc::clone(&resources),
        };
        let actor = tokio::spawn(actor.run());

        let _ = command_tx.send(Command::Refresh(RefreshTrigger::Mount));
        info!("Discovery started for {}", deps.user_id);

        (
            Self {
                commands: command_tx,
                state: state_rx,
                api: deps.api,
                resources,
                actor: Mutex::new(Some(actor)),
            },
            navigation_rx,
        )
    }

    /// Manual refresh; ignored while one is in flight.
    pub fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh(RefreshTrigger::Manual));
    }

    /// Sends a vibe. Independent of the refresh cycle; a failure is recorded
    /// as the snapshot's `signal_error` and returned.
    pub async fn send_vibe(&self, target_id: &str) -> Result<(), VibeError> {
        let result = self.api.send_vibe(target_id).await.map_err(|e| match e {
            VibeError::SignalSendFailed(_) => e,
            other => VibeError::SignalSendFailed(other.reason()),
        });
        let _ = self.commands.send(Command::SignalSettled(result.clone()));
        result
    }

    pub fn snapshot(&self) -> DiscoverySnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DiscoverySnapshot> {
        self.state.clone()
    }

    /// True until disposed or navigated away.
    pub fn is_running(&self) -> bool {
        self.resources.is_held()
    }

    /// Stops the timer, the presence heartbeat, the vibe listener and the
    /// location watch. Idempotent.
    pub fn dispose(&self) {
        self.resources.release();
        let actor = match self.actor.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(actor) = actor {
            actor.abort();
            info!("Discovery disposed");
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct Actor {
    snapshot: DiscoverySnapshot,
    publish: watch::Sender<DiscoverySnapshot>,
    commands: mpsc::UnboundedReceiver<Command>,
    loopback: mpsc::UnboundedSender<Command>,
    navigations: mpsc::UnboundedSender<Navigation>,
    location: Arc<dyn LocationSource>,
    proximity: Arc<ProximityClient>,
    presence: Arc<PresencePublisher>,
    settings: DiscoverySettings,
    resources: Arc<Resources>,
}

impl Actor {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            let navigated = self.handle(command);
            self.publish.send_replace(self.snapshot.clone());
            if navigated {
                break;
            }
        }
        // 跳转后本实例结束，释放定时器、订阅和定位
        self.resources.release();
    }

    /// Applies one command; returns true once navigation has been issued.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Refresh(trigger) => self.start_refresh(trigger),
            Command::RefreshFinished(report) => self.finish_refresh(report),
            Command::Located(point) => self.snapshot.center = Some(point),
            Command::Matched(conversation_id) => self.enter_match(conversation_id),
            Command::CelebrationElapsed => return self.navigate(),
            Command::SignalSettled(result) => self.snapshot.signal_error = result.err(),
        }
        false
    }

    fn start_refresh(&mut self, trigger: RefreshTrigger) {
        if self.snapshot.phase.is_matched() {
            debug!("Ignoring {} refresh after match", trigger);
            return;
        }
        if self.snapshot.refresh.in_flight {
            debug!("Refresh already in flight, ignoring {} trigger", trigger);
            return;
        }

        debug!("Starting {} refresh", trigger);
        self.snapshot.refresh.in_flight = true;
        self.snapshot.phase = Phase::Refreshing;

        let location = Arc::clone(&self.location);
        let proximity = Arc::clone(&self.proximity);
        let presence = Arc::clone(&self.presence);
        let constraints = self.settings.location;
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let report = match locate(location.as_ref(), &constraints).await {
                Ok(point) => {
                    presence.announce(point).await;
                    RefreshReport {
                        center: Some(point),
                        result: proximity.query_nearby(point).await,
                    }
                }
                Err(e) => RefreshReport {
                    center: None,
                    result: Err(e),
                },
            };
            let _ = loopback.send(Command::RefreshFinished(report));
        });
    }

    fn finish_refresh(&mut self, report: RefreshReport) {
        self.snapshot.refresh.in_flight = false;
        self.snapshot.loading = false;
        if let Some(center) = report.center {
            self.snapshot.center = Some(center);
        }

        match report.result {
            Ok(users) => {
                debug!("Refresh found {} nearby users", users.len());
                // 整体替换，不做合并
                self.snapshot.users = users;
                self.snapshot.refresh.last_error = None;
                self.snapshot.refresh.last_completed_at = Some(Utc::now());
            }
            Err(e) => {
                warn!("Refresh failed: {}", e);
                self.snapshot.refresh.last_error = Some(e);
            }
        }

        if !self.snapshot.phase.is_matched() {
            self.snapshot.phase = Phase::Idle;
        }
    }

    fn enter_match(&mut self, conversation_id: String) {
        if self.snapshot.phase.is_matched() {
            debug!("Already matched, ignoring conversation {}", conversation_id);
            return;
        }

        info!("Matched, conversation {}", conversation_id);
        self.snapshot.phase = Phase::MatchPending { conversation_id };

        let delay = self.settings.celebration_delay;
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = loopback.send(Command::CelebrationElapsed);
        });
    }

    fn navigate(&mut self) -> bool {
        let Phase::MatchPending { conversation_id } = &self.snapshot.phase else {
            return false;
        };
        let navigation = Navigation {
            conversation_id: conversation_id.clone(),
        };
        info!("Navigating to {}", navigation.path());
        self.snapshot.phase = Phase::Navigating {
            conversation_id: navigation.conversation_id.clone(),
        };
        let _ = self.navigations.send(navigation);
        true
    }
}
