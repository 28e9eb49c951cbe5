use super::*;
use opentmux_adapters::process::fake::FakeProcessOps;
use opentmux_core::FakeClock;
use opentmux_daemon::{ListenCtx, Listener};
use std::sync::Arc;
use tokio::net::UnixListener;

/// Bind a real `Listener` over a fresh `ListenCtx` on a tempdir socket and
/// hand back a `DaemonClient` pointed at it, so these tests exercise the
/// actual wire encode/decode path end to end rather than stubbing it out.
async fn serving_client() -> (DaemonClient, tempfile::TempDir, tokio::task::JoinHandle<()>) {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("opentmuxd.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let ctx = ListenCtx::new(Arc::new(FakeProcessOps::new()), Arc::new(FakeClock::new()));
    let serve = Listener::new(ctx);
    let handle = tokio::spawn(async move {
        serve.serve(listener, std::future::pending::<()>()).await;
    });

    let client = DaemonClient::at(socket_path);
    (client, dir, handle)
}

#[tokio::test]
async fn stats_round_trips_before_init() {
    let (client, _dir, handle) = serving_client().await;
    let response = client.send(&Request::Stats).await.unwrap();
    assert_eq!(
        response,
        Response::Stats {
            tracked_sessions: 0,
            pending_sessions: 0,
            queue_depth: 0,
        }
    );
    handle.abort();
}

#[tokio::test]
async fn init_then_event_round_trips() {
    let (client, dir, handle) = serving_client().await;
    let init = client
        .send(&Request::Init {
            directory: dir.path().to_string_lossy().to_string(),
            server_url: "http://127.0.0.1:4096".into(),
            overrides: None,
        })
        .await
        .unwrap();
    assert_eq!(
        init,
        Response::Init {
            enabled: true,
            message: "initialized".to_string(),
        }
    );

    let event = client
        .send(&Request::OnSessionCreated {
            event_type: "session.created".into(),
            id: "ses_a".into(),
            parent_id: "parent_a".into(),
            title: "title".into(),
        })
        .await
        .unwrap();
    assert!(matches!(event, Response::OnSessionCreated { .. }));
    handle.abort();
}

#[tokio::test]
async fn connect_to_a_missing_socket_reports_daemon_not_running() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("OPENTMUX_SOCKET_PATH", dir.path().join("no-such.sock"));
    let result = DaemonClient::connect();
    std::env::remove_var("OPENTMUX_SOCKET_PATH");
    assert!(matches!(result, Err(ClientError::DaemonNotRunning)));
}
