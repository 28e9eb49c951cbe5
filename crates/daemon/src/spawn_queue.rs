// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The spawn queue: a single-processor FIFO over `Multiplexer::spawn_pane`.
//!
//! The multiplexer is a single-writer global resource — concurrent
//! `split-window` invocations interleave layout state unpredictably — so
//! exactly one worker task drains this queue. Coalescing on `sessionId`
//! means a duplicate `OnSessionCreated` never produces a second pane: a
//! waiter for an id already queued or in flight is appended to that id's
//! waiter list instead of enqueuing a new item.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentmux_adapters::Multiplexer;
use opentmux_core::{Clock, Config, QueueItemInfo, SpawnOutcome};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, warn};

const STALE_THRESHOLD: Duration = Duration::from_secs(30);
const BASE_BACKOFF_MS: u64 = 250;

/// Emitted whenever queue depth changes or the queue drains to empty.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Updated { pending: u64 },
    Drained,
}

struct QueuedItem {
    info: QueueItemInfo,
    server_url: String,
}

struct State {
    items: VecDeque<QueuedItem>,
    in_flight: Option<String>,
    waiters: HashMap<String, Vec<oneshot::Sender<SpawnOutcome>>>,
    shutdown: bool,
}

impl State {
    fn contains(&self, session_id: &str) -> bool {
        self.in_flight.as_deref() == Some(session_id)
            || self.items.iter().any(|i| i.info.session_id == session_id)
    }

    fn pending_count(&self) -> u64 {
        self.items.len() as u64 + if self.in_flight.is_some() { 1 } else { 0 }
    }
}

/// Single-processor spawn queue. Construct with `SpawnQueue::spawn`, which
/// starts the processor task and returns both the queue handle and an
/// event receiver for `OnQueueUpdate`/`OnQueueDrained` notifications.
pub struct SpawnQueue {
    state: Mutex<State>,
    wake: Notify,
    shutting_down: AtomicBool,
    multiplexer: Arc<dyn Multiplexer>,
    clock: Arc<dyn Clock>,
    cfg: Config,
    events: mpsc::UnboundedSender<QueueEvent>,
}

impl SpawnQueue {
    pub fn spawn(
        multiplexer: Arc<dyn Multiplexer>,
        clock: Arc<dyn Clock>,
        cfg: Config,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                in_flight: None,
                waiters: HashMap::new(),
                shutdown: false,
            }),
            wake: Notify::new(),
            shutting_down: AtomicBool::new(false),
            multiplexer,
            clock,
            cfg,
            events: tx,
        });
        tokio::spawn(Self::run(Arc::clone(&queue)));
        (queue, rx)
    }

    /// Blocks until the item is spawned, fails, or the queue shuts down.
    pub async fn enqueue(&self, session_id: &str, title: &str, server_url: &str) -> SpawnOutcome {
        let (tx, rx) = oneshot::channel();
        let is_new = {
            let mut state = self.state.lock();
            if state.shutdown {
                return SpawnOutcome::failure();
            }
            let duplicate = state.contains(session_id);
            state
                .waiters
                .entry(session_id.to_string())
                .or_default()
                .push(tx);
            if !duplicate {
                state.items.push_back(QueuedItem {
                    info: QueueItemInfo {
                        session_id: session_id.to_string(),
                        title: title.to_string(),
                        enqueued_at: self.clock.now(),
                    },
                    server_url: server_url.to_string(),
                });
            }
            !duplicate
        };
        if is_new {
            self.notify_update();
            self.wake.notify_one();
        }
        rx.await.unwrap_or_else(|_| SpawnOutcome::failure())
    }

    pub fn pending_count(&self) -> u64 {
        self.state.lock().pending_count()
    }

    /// Resolve every outstanding waiter as failure and refuse further work.
    pub async fn shutdown(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.items.clear();
            std::mem::take(&mut state.waiters)
        };
        for (_, txs) in waiters {
            for tx in txs {
                let _ = tx.send(SpawnOutcome::failure());
            }
        }
        self.shutting_down.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn notify_update(&self) {
        let pending = self.pending_count();
        let _ = self.events.send(QueueEvent::Updated { pending });
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }

            let item = {
                let mut state = self.state.lock();
                match state.items.pop_front() {
                    Some(item) => {
                        state.in_flight = Some(item.info.session_id.clone());
                        Some(item)
                    }
                    None => None,
                }
            };

            let Some(item) = item else {
                self.wake.notified().await;
                continue;
            };

            let outcome =
                if self.clock.now().duration_since(item.info.enqueued_at) > STALE_THRESHOLD {
                    SpawnOutcome::failure()
                } else {
                    self.attempt_spawn(&item, &self.cfg).await
                };

            let (waiters, remaining) = {
                let mut state = self.state.lock();
                state.in_flight = None;
                let waiters = state.waiters.remove(&item.info.session_id).unwrap_or_default();
                (waiters, !state.items.is_empty())
            };

            for tx in waiters {
                let _ = tx.send(outcome.clone());
            }

            self.notify_update();

            if remaining {
                if !self.shutting_down.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(self.cfg.spawn_delay_ms)).await;
                }
            } else {
                let _ = self.events.send(QueueEvent::Drained);
            }
        }
    }

    async fn attempt_spawn(&self, item: &QueuedItem, cfg: &Config) -> SpawnOutcome {
        let max_attempts = cfg.max_retry_attempts + 1;
        for attempt in 0..max_attempts {
            if attempt > 0 {
                let backoff = BASE_BACKOFF_MS * 2u64.pow(attempt);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            match self
                .multiplexer
                .spawn_pane(
                    &item.info.session_id,
                    &item.info.title,
                    cfg,
                    &item.server_url,
                    attempt,
                )
                .await
            {
                Some(result) => return SpawnOutcome::success(result.pane_id),
                None => {
                    debug!(session_id = %item.info.session_id, attempt, "spawn attempt failed");
                }
            }
        }
        warn!(session_id = %item.info.session_id, "all spawn attempts exhausted");
        SpawnOutcome::failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentmux_adapters::NoOpMultiplexer;
    use opentmux_core::SystemClock;

    fn queue() -> (Arc<SpawnQueue>, mpsc::UnboundedReceiver<QueueEvent>) {
        SpawnQueue::spawn(
            Arc::new(NoOpMultiplexer::new()),
            Arc::new(SystemClock),
            Config::default(),
        )
    }

    #[tokio::test]
    async fn successful_enqueue_resolves_with_a_pane_id() {
        let (queue, _rx) = queue();
        let outcome = queue.enqueue("s1", "title", "http://127.0.0.1:4096").await;
        assert!(outcome.success);
        assert!(outcome.pane_id.is_some());
    }

    #[tokio::test]
    async fn pending_count_drops_to_zero_after_drain() {
        let (queue, _rx) = queue();
        let _ = queue.enqueue("s1", "title", "http://127.0.0.1:4096").await;
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_resolves_pending_waiters_as_failure() {
        let (queue, _rx) = queue();
        queue.shutdown().await;
        let outcome = queue.enqueue("s1", "title", "http://127.0.0.1:4096").await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn retries_use_the_configured_max_attempts() {
        let mux = Arc::new(NoOpMultiplexer::new());
        *mux.fail_next_spawn.lock() = true;
        let cfg = Config {
            max_retry_attempts: 1,
            ..Config::default()
        };
        let (queue, _rx) = SpawnQueue::spawn(mux.clone(), Arc::new(SystemClock), cfg);
        let outcome = queue.enqueue("s1", "title", "http://127.0.0.1:4096").await;
        // One failure, one retry: spawn_pane is called twice and the second
        // attempt succeeds.
        assert!(outcome.success);
        assert_eq!(mux.spawn_calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_enqueue_coalesces_onto_a_single_spawn() {
        let mux = Arc::new(NoOpMultiplexer::new());
        let (queue, _rx) =
            SpawnQueue::spawn(mux.clone(), Arc::new(SystemClock), Config::default());
        let a = queue.enqueue("s1", "title", "http://127.0.0.1:4096");
        let b = queue.enqueue("s1", "title", "http://127.0.0.1:4096");
        let (a, b) = tokio::join!(a, b);
        assert!(a.success && b.success);
        assert_eq!(mux.spawn_calls.lock().len(), 1);
    }
}
