use super::*;
use opentmux_adapters::process::fake::{FakeProcess, FakeProcessOps};
use opentmux_adapters::host::fake::FakeHostClient;
use opentmux_core::FakeClock;
use std::time::Duration;

fn reaper(
    process_ops: Arc<FakeProcessOps>,
    host: Arc<FakeHostClient>,
    clock: FakeClock,
) -> Arc<ZombieReaper> {
    ZombieReaper::new(
        process_ops,
        host,
        Arc::new(clock),
        "http://127.0.0.1:4096".to_string(),
        Duration::from_secs(30),
        3,
        Duration::from_secs(5),
    )
}

#[test]
fn parses_target_url_and_session_id() {
    let parsed = parse_attach_cmdline("opencode attach http://127.0.0.1:4096 --session ses_z");
    assert_eq!(
        parsed,
        Some(("http://127.0.0.1:4096".to_string(), "ses_z".to_string()))
    );
}

#[test]
fn non_attach_cmdline_parses_to_none() {
    assert_eq!(parse_attach_cmdline("bash -l"), None);
}

#[tokio::test]
async fn gate_requires_both_consecutive_checks_and_grace_period() {
    let process_ops = Arc::new(FakeProcessOps::new());
    process_ops.insert(
        7,
        FakeProcess {
            command: "opencode attach http://127.0.0.1:4096 --session ses_z".into(),
            alive: true,
            children: vec![],
        },
    );
    let host = Arc::new(FakeHostClient::new());
    host.set_active(&[]);
    let clock = FakeClock::new();
    let r = reaper(process_ops.clone(), host, clock.clone());

    // Two scans within 4s: count reaches 2, grace (5s) not met either.
    r.scan_once().await;
    clock.advance(Duration::from_secs(2));
    r.scan_once().await;
    assert!(process_ops.is_alive(7).await);

    // Third scan after a total of 6s: both thresholds now hold.
    clock.advance(Duration::from_secs(4));
    r.scan_once().await;
    assert!(!process_ops.is_alive(7).await);
}

#[tokio::test]
async fn active_session_clears_candidate_state() {
    let process_ops = Arc::new(FakeProcessOps::new());
    process_ops.insert(
        7,
        FakeProcess {
            command: "opencode attach http://127.0.0.1:4096 --session ses_z".into(),
            alive: true,
            children: vec![],
        },
    );
    let host = Arc::new(FakeHostClient::new());
    host.set_active(&[]);
    let clock = FakeClock::new();
    let r = reaper(process_ops.clone(), host.clone(), clock.clone());

    r.scan_once().await;
    clock.advance(Duration::from_secs(10));
    host.set_active(&[("ses_z", "idle")]);
    r.scan_once().await;
    assert!(r.candidates.lock().is_empty());

    // Even after the session disappears again it takes a fresh run of
    // scans to become eligible.
    host.set_active(&[]);
    clock.advance(Duration::from_secs(10));
    r.scan_once().await;
    assert!(process_ops.is_alive(7).await);
}

#[tokio::test]
async fn foreign_origin_is_never_killed_regardless_of_scan_count() {
    let process_ops = Arc::new(FakeProcessOps::new());
    process_ops.insert(
        9,
        FakeProcess {
            command: "opencode attach http://localhost:4097 --session ses_a".into(),
            alive: true,
            children: vec![],
        },
    );
    let host = Arc::new(FakeHostClient::new());
    host.set_active(&[]);
    let clock = FakeClock::new();
    let r = reaper(process_ops.clone(), host, clock.clone());

    for _ in 0..5 {
        r.scan_once().await;
        clock.advance(Duration::from_secs(10));
    }
    assert!(process_ops.is_alive(9).await);
}

#[tokio::test]
async fn host_unreachable_aborts_scan_without_killing_anything() {
    let process_ops = Arc::new(FakeProcessOps::new());
    process_ops.insert(
        7,
        FakeProcess {
            command: "opencode attach http://127.0.0.1:4096 --session ses_z".into(),
            alive: true,
            children: vec![],
        },
    );
    let host = Arc::new(FakeHostClient::new());
    host.fail();
    let clock = FakeClock::new();
    let r = reaper(process_ops.clone(), host, clock.clone());

    for _ in 0..5 {
        r.scan_once().await;
        clock.advance(Duration::from_secs(10));
    }
    assert!(process_ops.is_alive(7).await);
    assert!(r.candidates.lock().is_empty());
}

#[tokio::test]
async fn manual_reap_whitelists_own_sessions() {
    let process_ops = Arc::new(FakeProcessOps::new());
    process_ops.insert(
        7,
        FakeProcess {
            command: "opencode attach http://127.0.0.1:4096 --session ses_mine".into(),
            alive: true,
            children: vec![],
        },
    );
    process_ops.insert(
        8,
        FakeProcess {
            command: "opencode attach http://127.0.0.1:4096 --session ses_dead".into(),
            alive: true,
            children: vec![],
        },
    );
    let host = Arc::new(FakeHostClient::new());
    host.set_active(&[]);
    let r = reaper(process_ops.clone(), host, FakeClock::new());

    let killed = r.manual_reap(&["ses_mine".to_string()]).await;
    assert_eq!(killed, 1);
    assert!(process_ops.is_alive(7).await);
    assert!(!process_ops.is_alive(8).await);
}
