// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: OPENTMUX_STATE_DIR > XDG_STATE_HOME/opentmux >
/// ~/.local/state/opentmux. Used for the lock file and log file.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("OPENTMUX_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("opentmux"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/opentmux"))
}

/// Default socket path: `<temp-dir>/opentmuxd-<pid>.sock`.
pub fn socket_path() -> PathBuf {
    if let Ok(path) = std::env::var("OPENTMUX_SOCKET_PATH") {
        return PathBuf::from(path);
    }
    std::env::temp_dir().join(format!("opentmuxd-{}.sock", std::process::id()))
}

/// Poller tick interval override (defaults to 2s).
pub fn poll_interval_ms() -> Option<Duration> {
    std::env::var("OPENTMUX_POLL_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Whether the host's multiplexer-detected marker is present.
pub fn inside_multiplexer_marker() -> bool {
    std::env::var_os("TMUX").is_some()
}
