// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-socket accept loop and request dispatcher.
//!
//! One task per accepted connection; each connection reads and answers
//! requests in a loop until the peer disconnects. All requests share one
//! `ListenCtx`, which holds the (at most one) `SessionManager` created by
//! `Init`. Every method besides `Init` is valid before it — `Stats` and
//! `Shutdown` are no-ops, `OnSessionCreated` and `Reap` report nothing done.

use std::path::Path;
use std::sync::Arc;

use opentmux_adapters::{HostClient, Multiplexer, ProcessOps, ReqwestHostClient, TmuxMultiplexer};
use opentmux_core::{Clock, CloseReason, Config, Metrics};
use parking_lot::Mutex;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::protocol::{Request, Response};
use crate::protocol_wire::{self, ProtocolError, DEFAULT_TIMEOUT};
use crate::session_manager::SessionManager;

/// Shared state behind the control socket: process/clock dependencies that
/// outlive any one connection, and the session manager `Init` installs.
pub struct ListenCtx {
    process_ops: Arc<dyn ProcessOps>,
    host_client: Arc<dyn HostClient>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    manager: Mutex<Option<Arc<SessionManager>>>,
}

impl ListenCtx {
    pub fn new(process_ops: Arc<dyn ProcessOps>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            process_ops,
            host_client: Arc::new(ReqwestHostClient::new()),
            clock,
            metrics: Arc::new(Metrics::new()),
            manager: Mutex::new(None),
        })
    }

    fn manager(&self) -> Option<Arc<SessionManager>> {
        self.manager.lock().clone()
    }

    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Init {
                directory,
                server_url,
                overrides,
            } => self.handle_init(directory, server_url, overrides).await,

            Request::OnSessionCreated {
                event_type,
                id,
                parent_id,
                title,
            } => match self.manager() {
                Some(manager) => {
                    let accepted = manager
                        .on_session_created(&event_type, &id, &parent_id, &title)
                        .await;
                    Response::OnSessionCreated { accepted }
                }
                None => Response::OnSessionCreated { accepted: false },
            },

            Request::Shutdown { reason } => {
                info!(reason = %reason, "shutdown requested over control socket");
                if let Some(manager) = self.manager() {
                    manager.shutdown(CloseReason::Shutdown).await;
                }
                Response::Shutdown { ok: true }
            }

            Request::Stats => match self.manager() {
                Some(manager) => {
                    let snapshot = manager.stats();
                    Response::Stats {
                        tracked_sessions: snapshot.tracked_sessions,
                        pending_sessions: snapshot.pending_sessions,
                        queue_depth: snapshot.queue_depth,
                    }
                }
                None => Response::Stats {
                    tracked_sessions: 0,
                    pending_sessions: 0,
                    queue_depth: 0,
                },
            },

            Request::Reap => match self.manager() {
                Some(manager) => Response::Reap {
                    killed: manager.manual_reap().await,
                },
                None => Response::Reap { killed: 0 },
            },
        }
    }

    async fn handle_init(
        &self,
        directory: String,
        server_url: String,
        overrides: Option<opentmux_core::RawConfig>,
    ) -> Response {
        if self.manager().is_some() {
            return Response::Error {
                message: "already initialized".to_string(),
            };
        }

        let mut cfg: Config = Config::load_from_directory(Path::new(&directory));
        if let Some(raw) = overrides {
            cfg = cfg.merge(raw);
        }
        cfg.server_url = server_url;

        if let Err(err) = cfg.validate() {
            return Response::Error {
                message: format!("invalid config: {err}"),
            };
        }

        let multiplexer: Arc<dyn Multiplexer> =
            Arc::new(TmuxMultiplexer::new(self.process_ops.clone()));
        let manager = SessionManager::new(
            cfg.clone(),
            multiplexer,
            self.host_client.clone(),
            self.process_ops.clone(),
            self.clock.clone(),
            self.metrics.clone(),
        );
        *self.manager.lock() = Some(manager);

        Response::Init {
            enabled: cfg.enabled,
            message: "initialized".to_string(),
        }
    }
}

/// Owns the accept loop over an already-bound `UnixListener`.
pub struct Listener {
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(ctx: Arc<ListenCtx>) -> Self {
        Self { ctx }
    }

    /// Accept connections until `shutdown` resolves. Each connection is
    /// handled on its own task so one slow or stuck client never blocks
    /// others.
    pub async fn serve(&self, listener: UnixListener, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                handle_connection(ctx, stream).await;
                            });
                        }
                        Err(err) => {
                            warn!(error = %err, "failed to accept control-socket connection");
                        }
                    }
                }
                _ = &mut shutdown => {
                    debug!("listener stopping");
                    return;
                }
            }
        }
    }
}

async fn handle_connection(ctx: Arc<ListenCtx>, mut stream: UnixStream) {
    loop {
        let request = match protocol_wire::read_request(&mut stream, DEFAULT_TIMEOUT).await {
            Ok(request) => request,
            Err(ProtocolError::ConnectionClosed) => return,
            Err(err) => {
                debug!(error = %err, "control connection read failed");
                return;
            }
        };

        if request.is_query() {
            debug!(?request, "handling query");
        } else {
            info!(?request, "handling request");
        }

        let response = ctx.handle(request).await;
        if let Err(err) = protocol_wire::write_response(&mut stream, &response, DEFAULT_TIMEOUT).await {
            error!(error = %err, "failed to write control-socket response");
            return;
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
