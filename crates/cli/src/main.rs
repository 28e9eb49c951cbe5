// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! opentmux-ctl: the thin control-RPC client for `opentmuxd`.
//!
//! This is the boundary a host plugin shim drives (`init`/`event`/`stats`/
//! `shutdown`) plus an operator-facing `reap` for one-shot maintenance.
//! `opentmuxd` is not normally invoked directly — `init` starts it.

mod client;
mod daemon_process;
mod env;
mod exit_error;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use opentmux_core::RawConfig;
use opentmux_daemon::protocol::{Request, Response};

use client::{ClientError, DaemonClient};
use exit_error::ExitError;

#[derive(Parser)]
#[command(
    name = "opentmux-ctl",
    version,
    about = "Control client for opentmuxd, the tmux agent-pane coordination daemon"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start opentmuxd if it is not already running, then initialize it for
    /// a project directory and host server URL. Exactly one Init is ever
    /// honored by a given daemon process.
    Init(InitArgs),
    /// Push a `session.created` event (normally called once per child agent
    /// session by the host plugin shim).
    Event(EventArgs),
    /// Print tracked/pending/queue-depth counters.
    Stats {
        /// Emit machine-readable JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Ask a running daemon to shut down: stop the poller, drain the spawn
    /// queue, reap once more, then close every remaining pane. A no-op,
    /// not an error, if no daemon is reachable.
    Shutdown {
        /// Free-text reason recorded in the daemon's log.
        #[arg(long, default_value = "operator-requested")]
        reason: String,
    },
    /// Run the manual, independent-of-interval-scans global zombie reap.
    Reap(ReapArgs),
}

#[derive(clap::Args)]
struct InitArgs {
    /// Directory to search for `opentmux.json` / legacy config.
    #[arg(long = "dir", default_value = ".")]
    directory: String,

    /// Base URL of the host's HTTP surface (e.g. http://127.0.0.1:4096).
    #[arg(long = "server-url")]
    server_url: String,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

/// One flag per `Config` tunable; unset flags leave `Normalize` to fill in
/// defaults the same way a config file would.
#[derive(clap::Args, Default)]
struct ConfigOverrides {
    #[arg(long)]
    enabled: Option<bool>,

    #[arg(long, value_parser = [
        "main-horizontal",
        "main-vertical",
        "tiled",
        "even-horizontal",
        "even-vertical",
    ])]
    layout: Option<String>,

    #[arg(long = "main-pane-size")]
    main_pane_size: Option<u32>,

    #[arg(long = "max-agents-per-column")]
    max_agents_per_column: Option<u32>,

    #[arg(long = "spawn-delay-ms")]
    spawn_delay_ms: Option<u64>,

    #[arg(long = "max-retry-attempts")]
    max_retry_attempts: Option<u32>,

    #[arg(long = "layout-debounce-ms")]
    layout_debounce_ms: Option<u64>,

    #[arg(long = "reaper-enabled")]
    reaper_enabled: Option<bool>,

    #[arg(long = "reaper-interval-ms")]
    reaper_interval_ms: Option<u64>,

    #[arg(long = "reaper-min-zombie-checks")]
    reaper_min_zombie_checks: Option<u32>,

    #[arg(long = "reaper-grace-period-ms")]
    reaper_grace_period_ms: Option<u64>,

    #[arg(long = "rotate-port")]
    rotate_port: Option<bool>,

    #[arg(long = "max-ports")]
    max_ports: Option<u32>,
}

impl From<ConfigOverrides> for RawConfig {
    fn from(o: ConfigOverrides) -> Self {
        RawConfig {
            enabled: o.enabled,
            server_url: None,
            layout: o.layout,
            main_pane_size: o.main_pane_size,
            max_agents_per_column: o.max_agents_per_column,
            spawn_delay_ms: o.spawn_delay_ms,
            max_retry_attempts: o.max_retry_attempts,
            layout_debounce_ms: o.layout_debounce_ms,
            reaper_enabled: o.reaper_enabled,
            reaper_interval_ms: o.reaper_interval_ms,
            reaper_min_zombie_checks: o.reaper_min_zombie_checks,
            reaper_grace_period_ms: o.reaper_grace_period_ms,
            rotate_port: o.rotate_port,
            max_ports: o.max_ports,
        }
    }
}

#[derive(clap::Args)]
struct EventArgs {
    /// The control boundary only ever accepts `session.created`; anything
    /// else is rejected by the daemon itself.
    #[arg(long = "type", default_value = "session.created")]
    event_type: String,

    /// Host-assigned session id.
    #[arg(long)]
    id: String,

    /// Id of the parent session — only child/agent sessions earn a pane.
    #[arg(long = "parent-id")]
    parent_id: String,

    /// Pane title (truncated to 30 visible characters by the daemon).
    #[arg(long, default_value = "")]
    title: String,
}

#[derive(clap::Args)]
struct ReapArgs {
    /// Host URL to use for a standalone reap when no daemon is reachable.
    #[arg(long = "server-url")]
    server_url: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        let code = err.downcast_ref::<ExitError>().map_or(1, |e| e.code);
        eprintln!("Error: {err}");
        std::process::exit(code);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => init(args).await,
        Commands::Event(args) => event(args).await,
        Commands::Stats { json } => stats(json).await,
        Commands::Shutdown { reason } => shutdown(reason).await,
        Commands::Reap(args) => reap(args).await,
    }
}

async fn init(args: InitArgs) -> Result<()> {
    if args.server_url.trim().is_empty() {
        return Err(ExitError::usage("--server-url must not be empty"));
    }
    let directory =
        std::fs::canonicalize(&args.directory).unwrap_or_else(|_| args.directory.clone().into());

    let client = DaemonClient::connect_or_start()
        .map_err(|e| ExitError::failure(format!("could not reach opentmuxd: {e}")))?;

    let request = Request::Init {
        directory: directory.display().to_string(),
        server_url: args.server_url,
        overrides: Some(args.overrides.into()),
    };
    match client.send(&request).await? {
        Response::Init { enabled, message } => {
            println!("{message} (enabled={enabled})");
            Ok(())
        }
        Response::Error { message } => Err(ExitError::failure(message)),
        _ => Err(ExitError::failure("unexpected response from opentmuxd")),
    }
}

async fn event(args: EventArgs) -> Result<()> {
    let client = match DaemonClient::connect() {
        Ok(client) => client,
        Err(ClientError::DaemonNotRunning) => {
            println!("{{\"accepted\":false}}");
            return Err(ExitError::failure("opentmuxd is not running"));
        }
        Err(e) => return Err(ExitError::failure(format!("{e}"))),
    };

    let request = Request::OnSessionCreated {
        event_type: args.event_type,
        id: args.id,
        parent_id: args.parent_id,
        title: args.title,
    };
    match client.send(&request).await? {
        Response::OnSessionCreated { accepted } => {
            println!("{{\"accepted\":{accepted}}}");
            if accepted {
                Ok(())
            } else {
                Err(ExitError::failure("event rejected"))
            }
        }
        Response::Error { message } => Err(ExitError::failure(message)),
        _ => Err(ExitError::failure("unexpected response from opentmuxd")),
    }
}

async fn stats(json: bool) -> Result<()> {
    let client = match DaemonClient::connect() {
        Ok(client) => Some(client),
        Err(ClientError::DaemonNotRunning) => None,
        Err(e) => return Err(ExitError::failure(format!("{e}"))),
    };

    let (tracked_sessions, pending_sessions, queue_depth) = match client {
        Some(client) => match client.send(&Request::Stats).await? {
            Response::Stats {
                tracked_sessions,
                pending_sessions,
                queue_depth,
            } => (tracked_sessions, pending_sessions, queue_depth),
            other => {
                return Err(ExitError::failure(format!(
                    "unexpected response from opentmuxd: {other:?}"
                )))
            }
        },
        // Stats is valid before Init / with no daemon at all: all zero.
        None => (0, 0, 0),
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "trackedSessions": tracked_sessions,
                "pendingSessions": pending_sessions,
                "queueDepth": queue_depth,
            })
        );
    } else {
        println!("tracked sessions: {tracked_sessions}");
        println!("pending sessions: {pending_sessions}");
        println!("queue depth:      {queue_depth}");
    }
    Ok(())
}

async fn shutdown(reason: String) -> Result<()> {
    let client = match DaemonClient::connect() {
        Ok(client) => client,
        Err(ClientError::DaemonNotRunning) => {
            println!("opentmuxd is not running");
            return Ok(());
        }
        Err(e) => return Err(ExitError::failure(format!("{e}"))),
    };

    let pid = daemon_process::read_daemon_pid();
    match client.send(&Request::Shutdown { reason }).await? {
        Response::Shutdown { ok: true } => {
            if let Some(pid) = pid {
                daemon_process::wait_for_exit(pid, env::timeout_exit()).await;
            }
            println!("opentmuxd stopped");
            Ok(())
        }
        Response::Shutdown { ok: false } => {
            Err(ExitError::failure("opentmuxd reported an unsuccessful shutdown"))
        }
        Response::Error { message } => Err(ExitError::failure(message)),
        _ => Err(ExitError::failure("unexpected response from opentmuxd")),
    }
}

async fn reap(args: ReapArgs) -> Result<()> {
    match DaemonClient::connect() {
        Ok(client) => match client.send(&Request::Reap).await? {
            Response::Reap { killed } => {
                println!("killed {killed} zombie attach process(es)");
                Ok(())
            }
            Response::Error { message } => Err(ExitError::failure(message)),
            _ => Err(ExitError::failure("unexpected response from opentmuxd")),
        },
        Err(ClientError::DaemonNotRunning) => {
            let server_url = args.server_url.ok_or_else(|| {
                ExitError::usage("no opentmuxd reachable; pass --server-url for a standalone reap")
            })?;
            standalone_reap(&server_url).await
        }
        Err(e) => Err(ExitError::failure(format!("{e}"))),
    }
}

/// Run the same global-reap algorithm a live daemon would, against raw
/// adapters, for cleaning up after a daemon crash. There is no instance to
/// whitelist here, since no daemon is running to whitelist itself against.
async fn standalone_reap(server_url: &str) -> Result<()> {
    use opentmux_adapters::{ReqwestHostClient, SystemProcessOps};
    use opentmux_core::SystemClock;
    use opentmux_daemon::ZombieReaper;

    let reaper = ZombieReaper::new(
        Arc::new(SystemProcessOps::new()),
        Arc::new(ReqwestHostClient::new()),
        Arc::new(SystemClock),
        server_url.to_string(),
        Duration::from_secs(30),
        3,
        Duration::from_secs(5),
    );
    let killed = reaper.manual_reap(&[]).await;
    println!("killed {killed} zombie attach process(es)");
    Ok(())
}
