// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: PID-lock startup, log setup, clean
//! shutdown. The core never persists state across process lifetimes, so
//! unlike a crash-recoverable daemon there is no WAL/snapshot to replay —
//! startup is always a cold start.

use crate::env::{socket_path, state_dir};
use fs2::FileExt;
use std::fs::File;
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process-scoped paths resolved once at startup. Not part of `Config`'s
/// user-facing schema — these are environment/XDG-derived, not tunables.
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
}

impl Paths {
    pub fn resolve() -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        Ok(Self {
            lock_path: state_dir.join("opentmuxd.pid"),
            log_path: state_dir.join("opentmuxd.log"),
            socket_path: socket_path(),
            state_dir,
        })
    }

    /// Remove the socket and lock files. Best-effort: a failure here must
    /// not block the rest of shutdown.
    pub fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }
        if self.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.lock_path) {
                warn!(error = %e, "failed to remove lock file");
            }
        }
        info!("daemon shutdown complete");
    }
}

/// Holds the exclusive lock file for the process's lifetime; the lock is
/// released when this is dropped.
pub struct StartupResult {
    pub paths: Paths,
    pub listener: UnixListener,
    #[allow(dead_code)]
    lock_file: File,
}

/// Acquire the PID lock, bind the control socket, and return both. A failed
/// lock acquisition means another live daemon owns this state dir — we must
/// not remove its files, so cleanup-on-failure is the caller's job and
/// skips exactly that case (see `main.rs`).
pub async fn startup() -> Result<StartupResult, LifecycleError> {
    let paths = Paths::resolve()?;
    std::fs::create_dir_all(&paths.state_dir)?;

    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&paths.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    use std::io::Write;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    if paths.socket_path.exists() {
        let _ = std::fs::remove_file(&paths.socket_path);
    }
    let listener = UnixListener::bind(&paths.socket_path)
        .map_err(|e| LifecycleError::BindFailed(paths.socket_path.clone(), e))?;

    #[cfg(unix)]
    {
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&paths.socket_path, perms)?;
    }

    Ok(StartupResult {
        paths,
        listener,
        lock_file,
    })
}

/// Read the pid recorded by a lock file we failed to acquire, so the
/// daemon can print a human-readable "already running" message.
pub fn read_lock_pid(lock_path: &std::path::Path) -> Option<u32> {
    std::fs::read_to_string(lock_path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_under_state_dir() {
        std::env::set_var("OPENTMUX_STATE_DIR", "/tmp/opentmux-lifecycle-test");
        let paths = Paths::resolve().unwrap();
        assert_eq!(
            paths.lock_path,
            PathBuf::from("/tmp/opentmux-lifecycle-test/opentmuxd.pid")
        );
        std::env::remove_var("OPENTMUX_STATE_DIR");
    }
}
