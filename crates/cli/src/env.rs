// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable and path resolution for `opentmux-ctl`.

use std::path::PathBuf;
use std::time::Duration;

use crate::client::ClientError;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// State directory: `OPENTMUX_STATE_DIR` > `XDG_STATE_HOME/opentmux` >
/// `~/.local/state/opentmux`. Mirrors `opentmux_daemon::env::state_dir`
/// exactly, so the CLI and the daemon it spawns always agree on where the
/// lock file and log live.
pub fn state_dir() -> Result<PathBuf, ClientError> {
    if let Ok(dir) = std::env::var("OPENTMUX_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("opentmux"));
    }
    let home = std::env::var("HOME").map_err(|_| ClientError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/opentmux"))
}

/// Control-socket path. `OPENTMUX_SOCKET_PATH` always wins. Otherwise a
/// fixed path under the state directory — deliberately not the daemon's
/// pid-derived temp-dir default, since a separate CLI process has no way to
/// guess a stranger daemon's pid. `start_daemon_background` sets this same
/// env var on the child it spawns, so the two processes never have to
/// agree on anything beyond the state directory.
pub fn socket_path() -> Result<PathBuf, ClientError> {
    if let Ok(path) = std::env::var("OPENTMUX_SOCKET_PATH") {
        return Ok(PathBuf::from(path));
    }
    Ok(state_dir()?.join("opentmuxd.sock"))
}

/// PID lock file written by `opentmuxd` at startup.
pub fn lock_path() -> Result<PathBuf, ClientError> {
    Ok(state_dir()?.join("opentmuxd.pid"))
}

/// Explicit override for the `opentmuxd` binary path (tests, non-standard
/// installs).
pub fn daemon_binary() -> Option<String> {
    std::env::var("OPENTMUX_DAEMON_BINARY").ok()
}

pub fn timeout_ipc() -> Duration {
    parse_duration_ms("OPENTMUX_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

pub fn timeout_connect() -> Duration {
    parse_duration_ms("OPENTMUX_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

pub fn timeout_exit() -> Duration {
    parse_duration_ms("OPENTMUX_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(2))
}

pub fn poll_interval() -> Duration {
    parse_duration_ms("OPENTMUX_CONNECT_POLL_MS").unwrap_or(Duration::from_millis(50))
}
