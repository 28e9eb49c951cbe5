use super::*;
use opentmux_adapters::process::fake::FakeProcessOps;
use opentmux_core::FakeClock;
use tempfile::tempdir;

fn ctx() -> Arc<ListenCtx> {
    ListenCtx::new(Arc::new(FakeProcessOps::new()), Arc::new(FakeClock::new()))
}

#[tokio::test]
async fn stats_before_init_is_all_zero() {
    let ctx = ctx();
    let response = ctx.handle(Request::Stats).await;
    assert_eq!(
        response,
        Response::Stats {
            tracked_sessions: 0,
            pending_sessions: 0,
            queue_depth: 0,
        }
    );
}

#[tokio::test]
async fn on_session_created_before_init_is_rejected() {
    let ctx = ctx();
    let response = ctx
        .handle(Request::OnSessionCreated {
            event_type: "session.created".into(),
            id: "ses_a".into(),
            parent_id: "parent_a".into(),
            title: "title".into(),
        })
        .await;
    assert_eq!(response, Response::OnSessionCreated { accepted: false });
}

#[tokio::test]
async fn shutdown_before_init_is_a_no_op() {
    let ctx = ctx();
    let response = ctx
        .handle(Request::Shutdown {
            reason: "test".into(),
        })
        .await;
    assert_eq!(response, Response::Shutdown { ok: true });
}

#[tokio::test]
async fn reap_before_init_kills_nothing() {
    let ctx = ctx();
    let response = ctx.handle(Request::Reap).await;
    assert_eq!(response, Response::Reap { killed: 0 });
}

#[tokio::test]
async fn init_succeeds_and_a_second_init_is_rejected() {
    let ctx = ctx();
    let dir = tempdir().unwrap();
    let first = ctx
        .handle(Request::Init {
            directory: dir.path().to_string_lossy().to_string(),
            server_url: "http://127.0.0.1:4096".into(),
            overrides: None,
        })
        .await;
    assert_eq!(
        first,
        Response::Init {
            enabled: true,
            message: "initialized".to_string(),
        }
    );

    let second = ctx
        .handle(Request::Init {
            directory: dir.path().to_string_lossy().to_string(),
            server_url: "http://127.0.0.1:4096".into(),
            overrides: None,
        })
        .await;
    assert!(matches!(second, Response::Error { .. }));
}

#[tokio::test]
async fn init_honors_enabled_override() {
    let ctx = ctx();
    let dir = tempdir().unwrap();
    let overrides = opentmux_core::RawConfig {
        enabled: Some(false),
        ..Default::default()
    };
    let response = ctx
        .handle(Request::Init {
            directory: dir.path().to_string_lossy().to_string(),
            server_url: "http://127.0.0.1:4096".into(),
            overrides: Some(overrides),
        })
        .await;
    assert_eq!(
        response,
        Response::Init {
            enabled: false,
            message: "initialized".to_string(),
        }
    );
}

#[tokio::test]
async fn stats_after_init_reflects_tracked_sessions() {
    let ctx = ctx();
    let dir = tempdir().unwrap();
    ctx.handle(Request::Init {
        directory: dir.path().to_string_lossy().to_string(),
        server_url: "http://127.0.0.1:4096".into(),
        overrides: None,
    })
    .await;

    // No real tmux binary in the test environment, so the spawn attempt
    // fails; the point here is that Stats now reads through a live manager
    // instead of always answering the pre-Init all-zero response.
    ctx.handle(Request::OnSessionCreated {
        event_type: "session.created".into(),
        id: "ses_a".into(),
        parent_id: "parent_a".into(),
        title: "title".into(),
    })
    .await;

    let response = ctx.handle(Request::Stats).await;
    assert!(matches!(response, Response::Stats { .. }));
}
