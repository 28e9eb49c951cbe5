// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: owns tracked sessions, drives the poller, and
//! orchestrates the spawn queue, multiplexer adapter and zombie reaper.
//!
//! All mutable state (`sessions`, `pending`) lives behind one
//! `parking_lot::Mutex`; no mutation is ever held across an `.await` —
//! every async call (enqueue, host fetch, pane close) reads what it needs,
//! releases the lock, then acts.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentmux_adapters::{HostClient, Multiplexer, ProcessOps};
use opentmux_core::{Clock, CloseReason, Config, Metrics, TrackedSession};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::reaper::ZombieReaper;
use crate::spawn_queue::{QueueEvent, SpawnQueue};

/// 3x the poll interval.
const MISSING_GRACE_MULTIPLIER: u32 = 3;
/// Any tracked session older than this is force-closed.
const SESSION_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Consecutive failed `/session/status` polls before the manager concludes
/// the host is gone for good and tears itself down. Poll failures alone are
/// transient, but a sustained run of them is the separate host-health
/// signal that triggers shutdown.
const SUSTAINED_POLL_FAILURES: u32 = 3;

struct ManagerState {
    sessions: HashMap<String, TrackedSession>,
    pending: HashSet<String>,
}

pub struct SessionManager {
    cfg: Config,
    multiplexer: Arc<dyn Multiplexer>,
    host_client: Arc<dyn HostClient>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    queue: Arc<SpawnQueue>,
    reaper: Arc<ZombieReaper>,
    state: Mutex<ManagerState>,
    poller_handle: Mutex<Option<JoinHandle<()>>>,
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
    queue_events_handle: Mutex<Option<JoinHandle<()>>>,
    debounce_generation: AtomicU64,
    poll_failures: AtomicU32,
    shutting_down: AtomicBool,
    poll_interval: Duration,
}

impl SessionManager {
    pub fn new(
        cfg: Config,
        multiplexer: Arc<dyn Multiplexer>,
        host_client: Arc<dyn HostClient>,
        process_ops: Arc<dyn ProcessOps>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (queue, queue_rx) = SpawnQueue::spawn(multiplexer.clone(), clock.clone(), cfg.clone());
        let reaper = ZombieReaper::new(
            process_ops,
            host_client.clone(),
            clock.clone(),
            cfg.server_url.clone(),
            Duration::from_millis(cfg.reaper_interval_ms),
            cfg.reaper_min_zombie_checks,
            Duration::from_millis(cfg.reaper_grace_period_ms),
        );

        let manager = Arc::new(Self {
            cfg,
            multiplexer,
            host_client,
            clock,
            metrics,
            queue,
            reaper,
            state: Mutex::new(ManagerState {
                sessions: HashMap::new(),
                pending: HashSet::new(),
            }),
            poller_handle: Mutex::new(None),
            reaper_handle: Mutex::new(None),
            queue_events_handle: Mutex::new(None),
            debounce_generation: AtomicU64::new(0),
            poll_failures: AtomicU32::new(0),
            shutting_down: AtomicBool::new(false),
            poll_interval: crate::env::poll_interval_ms().unwrap_or(POLL_INTERVAL),
        });

        *manager.queue_events_handle.lock() =
            Some(manager.spawn_queue_event_consumer(queue_rx));

        if manager.cfg.reaper_enabled {
            *manager.reaper_handle.lock() = Some(manager.reaper.spawn());
        }

        manager
    }

    /// Validates and coalesces an incoming `session.created` event, then
    /// blocks (via the spawn queue) until the pane attempt resolves.
    /// Returns the `accepted` flag — whether the event passed the filters,
    /// independent of whether the eventual spawn succeeded.
    pub async fn on_session_created(
        self: &Arc<Self>,
        event_type: &str,
        id: &str,
        parent_id: &str,
        title: &str,
    ) -> bool {
        if !self.cfg.enabled || !self.multiplexer.inside_multiplexer() {
            return false;
        }
        if event_type != "session.created" || id.is_empty() || parent_id.is_empty() {
            return false;
        }

        {
            let mut state = self.state.lock();
            if state.sessions.contains_key(id) || state.pending.contains(id) {
                return false;
            }
            state.pending.insert(id.to_string());
        }
        self.update_metrics();

        let outcome = self.queue.enqueue(id, title, &self.cfg.server_url).await;

        let spawned = {
            let mut state = self.state.lock();
            state.pending.remove(id);
            if let (true, Some(pane_id)) = (outcome.success, outcome.pane_id.clone()) {
                let now = self.clock.now();
                state.sessions.insert(
                    id.to_string(),
                    TrackedSession::new(id.to_string(), pane_id, parent_id.to_string(), title, now),
                );
                true
            } else {
                false
            }
        };
        self.update_metrics();

        if spawned {
            self.ensure_poller_running();
        }
        true
    }

    pub fn stats(&self) -> opentmux_core::MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop poller, stop the debounce timer, shut the queue down, shut the
    /// reaper down (final scan then stop), then close every remaining
    /// tracked pane. Idempotent: a repeat call is a no-op.
    pub async fn shutdown(self: &Arc<Self>, reason: CloseReason) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(reason = reason.as_str(), "session manager shutting down");

        if let Some(handle) = self.poller_handle.lock().take() {
            handle.abort();
        }
        // Invalidate any pending debounced layout timer.
        self.debounce_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.queue_events_handle.lock().take() {
            handle.abort();
        }

        self.queue.shutdown().await;
        self.reaper.shutdown().await;
        if let Some(handle) = self.reaper_handle.lock().take() {
            handle.abort();
        }

        let remaining: Vec<TrackedSession> = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.sessions).into_values().collect()
        };
        for session in remaining {
            self.multiplexer.close_pane(&session.pane_id, &self.cfg).await;
        }
        self.update_metrics();
    }

    /// One-shot manual reap, whitelisting this instance's own tracked
    /// sessions so a live daemon never kills its own attach processes.
    pub async fn manual_reap(&self) -> u32 {
        let whitelist: Vec<String> = self.state.lock().sessions.keys().cloned().collect();
        self.reaper.manual_reap(&whitelist).await
    }

    fn ensure_poller_running(self: &Arc<Self>) {
        let mut handle = self.poller_handle.lock();
        if handle.is_some() {
            return;
        }
        let this = Arc::clone(self);
        let poll_interval = self.poll_interval;
        *handle = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if this.shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                let ok = this.poller_tick().await;
                if !ok {
                    let failures = this.poll_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if failures >= SUSTAINED_POLL_FAILURES {
                        let manager = Arc::clone(&this);
                        tokio::spawn(async move {
                            manager.shutdown(CloseReason::ServerUnreachable).await;
                        });
                        return;
                    }
                    continue;
                }
                this.poll_failures.store(0, Ordering::SeqCst);
                if this.state.lock().sessions.is_empty() {
                    *this.poller_handle.lock() = None;
                    return;
                }
            }
        }));
    }

    /// One poller tick. Returns `false` (a *transient* failure — the tick
    /// is simply skipped) when `/session/status` could not be fetched.
    async fn poller_tick(self: &Arc<Self>) -> bool {
        let tracked_ids: Vec<String> = { self.state.lock().sessions.keys().cloned().collect() };
        if tracked_ids.is_empty() {
            return true;
        }

        let status = match self.host_client.session_status(&self.cfg.server_url).await {
            Ok(status) => status,
            Err(_) => return false,
        };

        let now = self.clock.now();
        let missing_grace = self.poll_interval * MISSING_GRACE_MULTIPLIER;
        let mut to_close: Vec<(String, CloseReason)> = Vec::new();

        {
            let mut state = self.state.lock();
            for id in &tracked_ids {
                let Some(session) = state.sessions.get_mut(id) else {
                    continue;
                };

                // Idle wins over missing_too_long when both apply in the
                // same tick.
                let mut reason = None;
                if let Some(entry) = status.0.get(id) {
                    session.last_seen_at = now;
                    session.missing_since = None;
                    if entry.kind == "idle" {
                        reason = Some(CloseReason::Idle);
                    }
                } else {
                    if session.missing_since.is_none() {
                        session.missing_since = Some(now);
                    }
                    if let Some(missing_since) = session.missing_since {
                        if now.saturating_duration_since(missing_since) >= missing_grace {
                            reason = Some(CloseReason::MissingTooLong);
                        }
                    }
                }

                if reason.is_none()
                    && now.saturating_duration_since(session.created_at) >= SESSION_TIMEOUT
                {
                    reason = Some(CloseReason::Timeout);
                }

                if let Some(reason) = reason {
                    to_close.push((id.clone(), reason));
                }
            }
        }

        for (id, reason) in to_close {
            self.close_session(&id, reason).await;
        }
        true
    }

    async fn close_session(&self, session_id: &str, reason: CloseReason) {
        let pane_id = {
            let mut state = self.state.lock();
            state.sessions.remove(session_id).map(|s| s.pane_id)
        };
        if let Some(pane_id) = pane_id {
            info!(session_id, pane_id = %pane_id, reason = reason.as_str(), "closing session");
            self.multiplexer.close_pane(&pane_id, &self.cfg).await;
        }
        self.update_metrics();
    }

    fn spawn_queue_event_consumer(
        self: &Arc<Self>,
        mut rx: tokio::sync::mpsc::UnboundedReceiver<QueueEvent>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                this.update_metrics();
                if matches!(event, QueueEvent::Drained) {
                    this.arm_layout_debounce();
                }
            }
        })
    }

    /// Collapse layout churn during bursts: each drain (re)arms a one-shot
    /// timer; only the most recently armed timer actually applies a
    /// layout, since every earlier one observes a stale generation.
    fn arm_layout_debounce(self: &Arc<Self>) {
        let generation = self.debounce_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        let debounce = Duration::from_millis(self.cfg.layout_debounce_ms);
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if this.debounce_generation.load(Ordering::SeqCst) == generation
                && !this.shutting_down.load(Ordering::SeqCst)
            {
                this.multiplexer.apply_layout(&this.cfg).await;
            }
        });
    }

    fn update_metrics(&self) {
        let (tracked, pending) = {
            let state = self.state.lock();
            (state.sessions.len() as u64, state.pending.len() as u64)
        };
        self.metrics.set_tracked_sessions(tracked);
        self.metrics.set_pending_sessions(pending);
        self.metrics.set_queue_depth(self.queue.pending_count());
    }
}

#[cfg(test)]
#[path = "session_manager_tests.rs"]
mod tests;
