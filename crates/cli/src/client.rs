// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket client: the thin RPC layer `opentmux-ctl` uses to talk to
//! `opentmuxd` over the same length-prefixed JSON wire format the listener
//! speaks (see `opentmux_daemon::protocol_wire`).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use opentmux_daemon::protocol::{Request, Response};
use opentmux_daemon::protocol_wire::{self, ProtocolError};
use thiserror::Error;
use tokio::net::UnixStream;

use crate::daemon_process;
use crate::env;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("opentmuxd is not running")]
    DaemonNotRunning,

    #[error("failed to start opentmuxd: {0}")]
    DaemonStartFailed(String),

    #[error("timed out waiting for opentmuxd to start")]
    DaemonStartTimeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("unexpected response from opentmuxd")]
    UnexpectedResponse,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine state directory")]
    NoStateDir,
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to an already-running daemon; no auto-start. Used by
    /// `event`/`stats`/`shutdown`/`reap`, which are operational calls that
    /// should never silently spin up a new daemon.
    pub fn connect() -> Result<Self, ClientError> {
        let socket_path = env::socket_path()?;
        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }
        Ok(Self { socket_path })
    }

    /// Connect, starting `opentmuxd` in the background if no socket is
    /// present yet. Used only by `init`, since exactly one `Init` is ever
    /// honored and it is the natural point to bring the daemon up.
    pub fn connect_or_start() -> Result<Self, ClientError> {
        match Self::connect() {
            Ok(client) => Ok(client),
            Err(ClientError::DaemonNotRunning) => {
                let child = daemon_process::start_daemon_background()?;
                Self::connect_with_retry(env::timeout_connect(), child)
            }
            Err(e) => Err(e),
        }
    }

    fn connect_with_retry(
        timeout: Duration,
        mut child: std::process::Child,
    ) -> Result<Self, ClientError> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(ClientError::DaemonStartFailed(format!(
                    "opentmuxd exited with {status}"
                )));
            }
            match Self::connect() {
                Ok(client) => return Ok(client),
                Err(ClientError::DaemonNotRunning) => std::thread::sleep(env::poll_interval()),
                Err(e) => return Err(e),
            }
        }
        Err(ClientError::DaemonStartTimeout)
    }

    #[cfg(test)]
    pub(crate) fn at(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();
        let timeout = env::timeout_ipc();

        let data = protocol_wire::encode(request)?;
        tokio::time::timeout(timeout, protocol_wire::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let bytes = tokio::time::timeout(timeout, protocol_wire::read_message(&mut reader))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        Ok(protocol_wire::decode(&bytes)?)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
