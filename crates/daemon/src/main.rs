// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! opentmuxd: the coordination daemon that attaches a tmux pane to every
//! agent session an opencode-compatible host spawns, streams I/O into it,
//! and reaps it when the session goes away.
//!
//! The daemon is started by the `opentmux-ctl` CLI (or the host plugin
//! shim) and should not normally be invoked directly. It listens on a Unix
//! socket under its state directory for `Init`/`OnSessionCreated`/`Stats`/
//! `Shutdown`/`Reap` requests and otherwise does nothing until one arrives.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use opentmux_adapters::SystemProcessOps;
use opentmux_core::SystemClock;
use opentmux_daemon::lifecycle::{self, LifecycleError, Paths};
use opentmux_daemon::listener::{ListenCtx, Listener};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("opentmuxd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("opentmuxd {}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Coordination daemon: attaches a tmux pane to every agent session");
                println!("an opencode-compatible host spawns.");
                println!();
                println!("USAGE:");
                println!("    opentmuxd");
                println!();
                println!("opentmuxd is typically started by the `opentmux-ctl` CLI and should");
                println!("not be invoked directly. It listens on a Unix socket for commands.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: opentmuxd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let paths = Paths::resolve()?;
    let log_guard = setup_logging(&paths)?;

    info!("starting opentmuxd");

    let startup = match lifecycle::startup().await {
        Ok(startup) => startup,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = lifecycle::read_lock_pid(&paths.lock_path)
                .map(|pid| pid.to_string())
                .unwrap_or_default();
            eprintln!("opentmuxd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(err) => {
            error!(error = %err, "failed to start opentmuxd");
            drop(log_guard);
            return Err(err.into());
        }
    };

    let shutdown_notify = Arc::new(Notify::new());
    let process_ops = Arc::new(SystemProcessOps::default());
    let ctx = ListenCtx::new(process_ops, Arc::new(SystemClock));
    let listener = Listener::new(ctx);

    let serve_shutdown = shutdown_notify.clone();
    let serve_handle = tokio::spawn(async move {
        listener
            .serve(startup.listener, async move {
                serve_shutdown.notified().await;
            })
            .await;
    });

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %paths.socket_path.display(), "opentmuxd ready");
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    shutdown_notify.notify_one();
    let _ = serve_handle.await;

    paths.cleanup();
    Ok(())
}

fn setup_logging(
    paths: &Paths,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = paths.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        paths.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        paths.log_path.file_name().ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
