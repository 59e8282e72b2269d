mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::sleep;

use support::{FakeApi, FakeFeed, FakeLocation, SELF_ID, user};
use vibe::discovery::{Coordinator, DiscoveryDeps, DiscoverySettings, Navigation, Phase};
use vibe::error::VibeError;
use vibe::models::VibeSignal;

struct Harness {
    api: Arc<FakeApi>,
    feed: Arc<FakeFeed>,
}

impl Harness {
    fn new() -> Self {
        Self {
            api: Arc::new(FakeApi::default()),
            feed: Arc::new(FakeFeed::default()),
        }
    }

    fn start_at(
        &self,
        location: FakeLocation,
    ) -> (Coordinator, tokio::sync::mpsc::UnboundedReceiver<Navigation>) {
        let deps = DiscoveryDeps {
            api: self.api.clone(),
            feed: self.feed.clone(),
            location: Arc::new(location),
            user_id: SELF_ID.to_string(),
        };
        Coordinator::start(deps, DiscoverySettings::default())
    }

    fn start(&self) -> (Coordinator, tokio::sync::mpsc::UnboundedReceiver<Navigation>) {
        self.start_at(FakeLocation::at(31.23, 121.47))
    }
}

#[tokio::test(start_paused = true)]
async fn refresh_triggers_never_overlap() {
    let h = Harness::new();
    h.api.set_query_delay(Duration::from_secs(5));
    let (coordinator, _nav) = h.start();

    sleep(Duration::from_millis(10)).await;
    assert!(coordinator.snapshot().refresh.in_flight);
    assert_eq!(coordinator.snapshot().phase, Phase::Refreshing);

    coordinator.refresh();
    coordinator.refresh();
    coordinator.refresh();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.api.queries(), 1);

    sleep(Duration::from_secs(6)).await;
    let snapshot = coordinator.snapshot();
    assert!(!snapshot.refresh.in_flight);
    assert!(!snapshot.loading);
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(h.api.max_in_flight.load(Ordering::SeqCst), 1);

    // 上一次完成后可以再次刷新
    coordinator.refresh();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.api.queries(), 2);
}

#[tokio::test(start_paused = true)]
async fn successful_refresh_replaces_the_list() {
    let h = Harness::new();
    h.api.set_nearby(vec![user("a", 40.0), user("b", 200.0)]);
    let (coordinator, _nav) = h.start();

    sleep(Duration::from_millis(100)).await;
    let snapshot = coordinator.snapshot();
    let ids: Vec<_> = snapshot.users.iter().map(|u| u.user_id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert!(snapshot.refresh.last_completed_at.is_some());
    assert!(snapshot.center.is_some());

    h.api.set_nearby(vec![user("c", 500.0)]);
    coordinator.refresh();
    sleep(Duration::from_millis(100)).await;
    let ids: Vec<_> = coordinator
        .snapshot()
        .users
        .iter()
        .map(|u| u.user_id.clone())
        .collect();
    assert_eq!(ids, ["c"]);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_the_previous_list() {
    let h = Harness::new();
    h.api.set_nearby(vec![user("a", 40.0)]);
    let (coordinator, _nav) = h.start();
    sleep(Duration::from_millis(100)).await;
    let completed = coordinator.snapshot().refresh.last_completed_at;

    h.api.fail_nearby(VibeError::QueryFailed("network".into()));
    coordinator.refresh();
    sleep(Duration::from_millis(100)).await;

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.users.len(), 1);
    assert_eq!(snapshot.users[0].user_id, "a");
    assert_eq!(
        snapshot.refresh.last_error,
        Some(VibeError::QueryFailed("network".into()))
    );
    assert_eq!(snapshot.refresh.last_completed_at, completed);
    assert_eq!(snapshot.phase, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn local_user_is_filtered_out() {
    let h = Harness::new();
    h.api.set_nearby(vec![user("a", 40.0), user(SELF_ID, 0.0)]);
    let (coordinator, _nav) = h.start();
    sleep(Duration::from_millis(100)).await;

    let users = coordinator.snapshot().users;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, "a");
    assert_eq!(users[0].distance_label(), "50m away");
}

#[tokio::test(start_paused = true)]
async fn location_failure_is_recorded_without_querying() {
    let h = Harness::new();
    let (coordinator, _nav) = h.start_at(FakeLocation(Err(VibeError::PermissionDenied)));
    sleep(Duration::from_millis(100)).await;

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.refresh.last_error, Some(VibeError::PermissionDenied));
    assert!(!snapshot.loading);
    assert!(snapshot.center.is_none());
    assert_eq!(h.api.queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn timer_refreshes_every_interval() {
    let h = Harness::new();
    let (coordinator, _nav) = h.start();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(h.api.queries(), 1);

    sleep(Duration::from_secs(20)).await;
    assert_eq!(h.api.queries(), 2);
    sleep(Duration::from_secs(20)).await;
    assert_eq!(h.api.queries(), 3);
    assert!(h.api.presence_touches.load(Ordering::SeqCst) >= 3);
    drop(coordinator);
}

#[tokio::test(start_paused = true)]
async fn match_during_refresh_navigates_once() {
    let h = Harness::new();
    h.api.set_query_delay(Duration::from_millis(500));
    h.api.set_nearby(vec![user("b", 120.0)]);
    h.api.add_conversation("b", "c42");
    let (coordinator, mut nav) = h.start();

    sleep(Duration::from_millis(10)).await;
    assert!(coordinator.snapshot().refresh.in_flight);

    h.feed.emit(VibeSignal::new("b", SELF_ID));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(
        coordinator.snapshot().phase,
        Phase::MatchPending {
            conversation_id: "c42".into()
        }
    );

    // 匹配后的刷新请求和重复事件都被忽略
    coordinator.refresh();
    h.feed.emit(VibeSignal::new(SELF_ID, "b"));

    // 刷新在庆祝期间完成，阶段保持不变
    sleep(Duration::from_millis(590)).await;
    let snapshot = coordinator.snapshot();
    assert!(!snapshot.refresh.in_flight);
    assert_eq!(snapshot.users.len(), 1);
    assert_eq!(
        snapshot.phase,
        Phase::MatchPending {
            conversation_id: "c42".into()
        }
    );
    assert_eq!(h.api.queries(), 1);

    sleep(Duration::from_millis(300)).await;
    let navigation = nav.recv().await.expect("navigation");
    assert_eq!(navigation.path(), "/chat/c42");
    assert_eq!(
        coordinator.snapshot().phase,
        Phase::Navigating {
            conversation_id: "c42".into()
        }
    );
    assert!(nav.recv().await.is_none());
    assert!(!coordinator.is_running());
}

#[tokio::test(start_paused = true)]
async fn unrelated_or_one_sided_vibes_do_not_match() {
    let h = Harness::new();
    let (coordinator, _nav) = h.start();
    sleep(Duration::from_millis(10)).await;

    h.feed.emit(VibeSignal::new("x", "y"));
    h.feed.emit(VibeSignal::new("b", SELF_ID));
    sleep(Duration::from_secs(2)).await;

    assert_eq!(coordinator.snapshot().phase, Phase::Idle);
    assert!(coordinator.is_running());
}

#[tokio::test(start_paused = true)]
async fn failed_vibe_is_reported_and_cleared() {
    let h = Harness::new();
    let (coordinator, _nav) = h.start();
    sleep(Duration::from_millis(10)).await;

    h.api.fail_vibes(VibeError::Backend("boom".into()));
    let result = coordinator.send_vibe("b").await;
    assert_eq!(result, Err(VibeError::SignalSendFailed("boom".into())));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(
        coordinator.snapshot().signal_error,
        Some(VibeError::SignalSendFailed("boom".into()))
    );

    h.api.clear_vibe_failure();
    coordinator.send_vibe("b").await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(coordinator.snapshot().signal_error, None);
    assert_eq!(*h.api.vibes_sent.lock().unwrap(), ["b"]);
}

#[tokio::test(start_paused = true)]
async fn dispose_is_idempotent_and_stops_everything() {
    let h = Harness::new();
    let (coordinator, mut nav) = h.start();
    sleep(Duration::from_millis(100)).await;
    assert!(coordinator.is_running());
    assert_eq!(h.feed.subscriptions.load(Ordering::SeqCst), 1);

    coordinator.dispose();
    coordinator.dispose();
    sleep(Duration::from_millis(10)).await;

    assert!(!coordinator.is_running());
    assert_eq!(h.feed.unsubscribed(), 1);
    assert!(nav.recv().await.is_none());

    let queries = h.api.queries();
    let touches = h.api.presence_touches.load(Ordering::SeqCst);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.api.queries(), queries);
    assert_eq!(h.api.presence_touches.load(Ordering::SeqCst), touches);

    drop(coordinator);
    assert_eq!(h.feed.unsubscribed(), 1);
}

#[tokio::test(start_paused = true)]
async fn presence_failures_do_not_abort_refresh() {
    let h = Harness::new();
    h.api.fail_presence(true);
    h.api.set_nearby(vec![user("a", 40.0)]);
    let (coordinator, _nav) = h.start();
    sleep(Duration::from_millis(100)).await;

    let snapshot = coordinator.snapshot();
    assert!(h.api.location_updates.load(Ordering::SeqCst) >= 1);
    assert_eq!(snapshot.users.len(), 1);
    assert_eq!(snapshot.refresh.last_error, None);
    assert!(snapshot.refresh.last_completed_at.is_some());

    // 定时刷新也照常进行
    sleep(Duration::from_secs(20)).await;
    assert_eq!(h.api.queries(), 2);
    assert!(coordinator.is_running());
}

#[tokio::test(start_paused = true)]
async fn failed_resolution_waits_for_the_next_vibe() {
    let h = Harness::new();
    h.api.add_conversation("b", "c42");
    h.api.fail_next_resolutions(1);
    let (coordinator, mut nav) = h.start();
    sleep(Duration::from_millis(10)).await;

    h.feed.emit(VibeSignal::new("b", SELF_ID));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.api.resolutions.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.snapshot().phase, Phase::Idle);

    h.feed.emit(VibeSignal::new(SELF_ID, "b"));
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.api.resolutions.load(Ordering::SeqCst), 2);

    let navigation = nav.recv().await.expect("navigation");
    assert_eq!(navigation.path(), "/chat/c42");
    assert!(nav.recv().await.is_none());
}
