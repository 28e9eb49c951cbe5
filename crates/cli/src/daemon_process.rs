// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Start/stop the `opentmuxd` background process on behalf of `init` and
//! `shutdown`.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use crate::client::ClientError;
use crate::env;

/// Spawn `opentmuxd` detached, pointing it at the same socket/state paths
/// this CLI process will use to find it again.
pub fn start_daemon_background() -> Result<std::process::Child, ClientError> {
    let state_dir = env::state_dir()?;
    std::fs::create_dir_all(&state_dir)?;
    let socket_path = env::socket_path()?;
    let binary = find_daemon_binary();

    Command::new(&binary)
        .env("OPENTMUX_SOCKET_PATH", &socket_path)
        .env("OPENTMUX_STATE_DIR", &state_dir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Locate the `opentmuxd` binary: an explicit override, a sibling of the
/// running `opentmux-ctl` binary (the installed layout), then a bare
/// `$PATH` lookup (the dev/cargo-run layout).
fn find_daemon_binary() -> PathBuf {
    if let Some(path) = env::daemon_binary() {
        return PathBuf::from(path);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("opentmuxd");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("opentmuxd")
}

/// Read the pid `opentmuxd` recorded in its lock file, if any.
pub fn read_daemon_pid() -> Option<u32> {
    let path = env::lock_path().ok()?;
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn process_exists(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Poll until `pid` is gone or `timeout` elapses.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(env::poll_interval()).await;
    }
    false
}
