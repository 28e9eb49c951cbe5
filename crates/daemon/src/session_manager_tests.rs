use super::*;
use opentmux_adapters::NoOpMultiplexer;
use opentmux_adapters::host::fake::FakeHostClient;
use opentmux_adapters::process::fake::FakeProcessOps;
use opentmux_core::FakeClock;

fn manager_with(cfg: Config) -> (Arc<SessionManager>, Arc<NoOpMultiplexer>, Arc<FakeHostClient>, FakeClock) {
    let mux = Arc::new(NoOpMultiplexer::new());
    let host = Arc::new(FakeHostClient::new());
    let process_ops = Arc::new(FakeProcessOps::new());
    let clock = FakeClock::new();
    let metrics = Arc::new(Metrics::default());
    let manager = SessionManager::new(
        cfg,
        mux.clone(),
        host.clone(),
        process_ops,
        Arc::new(clock.clone()),
        metrics,
    );
    (manager, mux, host, clock)
}

fn enabled_cfg() -> Config {
    Config {
        reaper_enabled: false,
        ..Config::default()
    }
}

#[tokio::test]
async fn on_session_created_accepts_and_tracks() {
    let (manager, mux, _host, _clock) = manager_with(enabled_cfg());
    let accepted = manager
        .on_session_created("session.created", "ses_a", "parent_a", "title")
        .await;
    assert!(accepted);
    assert_eq!(mux.spawn_calls.lock().len(), 1);
    assert_eq!(manager.stats().tracked_sessions, 1);
    assert_eq!(manager.stats().pending_sessions, 0);
    manager.shutdown(CloseReason::Shutdown).await;
}

#[tokio::test]
async fn on_session_created_rejects_wrong_event_type() {
    let (manager, mux, _host, _clock) = manager_with(enabled_cfg());
    let accepted = manager
        .on_session_created("session.idle", "ses_a", "parent_a", "title")
        .await;
    assert!(!accepted);
    assert!(mux.spawn_calls.lock().is_empty());
}

#[tokio::test]
async fn on_session_created_rejects_when_disabled() {
    let cfg = Config {
        enabled: false,
        ..enabled_cfg()
    };
    let (manager, mux, _host, _clock) = manager_with(cfg);
    let accepted = manager
        .on_session_created("session.created", "ses_a", "parent_a", "title")
        .await;
    assert!(!accepted);
    assert!(mux.spawn_calls.lock().is_empty());
}

#[tokio::test]
async fn duplicate_session_created_is_rejected() {
    let (manager, mux, _host, _clock) = manager_with(enabled_cfg());
    assert!(
        manager
            .on_session_created("session.created", "ses_a", "parent_a", "title")
            .await
    );
    assert!(
        !manager
            .on_session_created("session.created", "ses_a", "parent_a", "title")
            .await
    );
    assert_eq!(mux.spawn_calls.lock().len(), 1);
    manager.shutdown(CloseReason::Shutdown).await;
}

#[tokio::test]
async fn failed_spawn_leaves_nothing_tracked() {
    let cfg = Config {
        max_retry_attempts: 0,
        ..enabled_cfg()
    };
    let (manager, mux, _host, _clock) = manager_with(cfg);
    *mux.fail_next_spawn.lock() = true;
    let accepted = manager
        .on_session_created("session.created", "ses_a", "parent_a", "title")
        .await;
    assert!(accepted);
    assert_eq!(manager.stats().tracked_sessions, 0);
    assert_eq!(manager.stats().pending_sessions, 0);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_closes_remaining_panes() {
    let (manager, mux, _host, _clock) = manager_with(enabled_cfg());
    manager
        .on_session_created("session.created", "ses_a", "parent_a", "title")
        .await;
    manager.shutdown(CloseReason::Shutdown).await;
    manager.shutdown(CloseReason::Shutdown).await;
    assert_eq!(mux.close_calls.lock().len(), 1);
    assert_eq!(manager.stats().tracked_sessions, 0);
}

#[tokio::test]
async fn stats_are_all_zero_before_any_session() {
    let (manager, _mux, _host, _clock) = manager_with(enabled_cfg());
    let snapshot = manager.stats();
    assert_eq!(snapshot.tracked_sessions, 0);
    assert_eq!(snapshot.pending_sessions, 0);
    assert_eq!(snapshot.queue_depth, 0);
}
