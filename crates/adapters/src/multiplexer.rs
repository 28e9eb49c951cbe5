// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexer adapter: the only module allowed to shell out to the
//! terminal-multiplexer binary. Caches the binary's discovery result and
//! recent host-health probes so a burst of spawns doesn't re-probe either.

use crate::process::{kill_with_grace, ProcessOps};
use crate::subprocess::{run_with_timeout, HEALTH_TIMEOUT, TMUX_TIMEOUT};
use async_trait::async_trait;
use opentmux_core::Config;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Result of a successful `SpawnPane` call.
#[derive(Debug, Clone)]
pub struct SpawnResult {
    pub pane_id: String,
}

#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Detected by a host-provided environment marker; if absent, refuse
    /// all spawns.
    fn inside_multiplexer(&self) -> bool;

    /// GET `<url>/health` with a 3s timeout. Positive results are cached
    /// per url; on negative, retries up to 2 attempts with a 250ms pause.
    async fn host_healthy(&self, url: &str) -> bool;

    async fn spawn_pane(
        &self,
        session_id: &str,
        title: &str,
        cfg: &Config,
        url: &str,
        retry_count: u32,
    ) -> Option<SpawnResult>;

    async fn close_pane(&self, pane_id: &str, cfg: &Config) -> bool;

    async fn apply_layout(&self, cfg: &Config);
}

const MULTIPLEXER_MARKER_ENV: &str = "TMUX";

pub struct TmuxMultiplexer {
    process_ops: std::sync::Arc<dyn ProcessOps>,
    health_cache: Mutex<HashMap<String, Instant>>,
    binary_path: Mutex<Option<String>>,
}

impl TmuxMultiplexer {
    pub fn new(process_ops: std::sync::Arc<dyn ProcessOps>) -> Self {
        Self {
            process_ops,
            health_cache: Mutex::new(HashMap::new()),
            binary_path: Mutex::new(None),
        }
    }

    async fn discover_binary(&self) -> String {
        if let Some(path) = self.binary_path.lock().clone() {
            return path;
        }
        // `tmux -V` both confirms the binary is runnable and primes the
        // cache; failures still resolve to the bare "tmux" name so later
        // calls surface the real invocation error instead of a cache miss.
        let path = "tmux".to_string();
        let _ = run_with_timeout(Command::new(&path).arg("-V"), TMUX_TIMEOUT, "tmux -V").await;
        *self.binary_path.lock() = Some(path.clone());
        path
    }
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    fn inside_multiplexer(&self) -> bool {
        std::env::var_os(MULTIPLEXER_MARKER_ENV).is_some()
    }

    async fn host_healthy(&self, url: &str) -> bool {
        {
            let cache = self.health_cache.lock();
            if let Some(checked_at) = cache.get(url) {
                if checked_at.elapsed() < Duration::from_secs(30) {
                    return true;
                }
            }
        }

        for attempt in 0..2 {
            if probe_health(url).await {
                self.health_cache.lock().insert(url.to_string(), Instant::now());
                return true;
            }
            if attempt == 0 {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
        false
    }

    async fn spawn_pane(
        &self,
        session_id: &str,
        title: &str,
        cfg: &Config,
        url: &str,
        retry_count: u32,
    ) -> Option<SpawnResult> {
        if !cfg.enabled || !self.inside_multiplexer() || !self.host_healthy(url).await {
            return None;
        }
        if retry_count > 0 {
            tracing::debug!(session_id, retry_count, "retrying tmux spawn");
        }
        let tmux = self.discover_binary().await;

        let attach_cmd = format!("opencode attach {url} --session {session_id}");
        let mut cmd = Command::new(&tmux);
        cmd.args([
            "split-window",
            "-h",
            "-d",
            "-P",
            "-F",
            "#{pane_id}",
            &attach_cmd,
        ]);
        let output = run_with_timeout(cmd, TMUX_TIMEOUT, "tmux split-window")
            .await
            .ok()?;
        if !output.status.success() {
            tracing::warn!(session_id, "tmux split-window failed");
            return None;
        }
        let pane_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if pane_id.is_empty() {
            return None;
        }

        let truncated_title = opentmux_core::truncate_title(title);
        let mut set_title = Command::new(&tmux);
        set_title.args(["select-pane", "-t", &pane_id, "-T", &truncated_title]);
        let _ = run_with_timeout(set_title, TMUX_TIMEOUT, "tmux select-pane -T").await;

        self.apply_layout(cfg).await;

        Some(SpawnResult { pane_id })
    }

    async fn close_pane(&self, pane_id: &str, cfg: &Config) -> bool {
        let tmux = self.discover_binary().await;

        let mut list_cmd = Command::new(&tmux);
        list_cmd.args(["display-message", "-t", pane_id, "-p", "#{pane_pid}"]);
        if let Ok(output) = run_with_timeout(list_cmd, TMUX_TIMEOUT, "tmux display-message").await {
            if output.status.success() {
                let pane_pid_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if let Ok(shell_pid) = pane_pid_str.parse::<u32>() {
                    for child in self.process_ops.children(shell_pid).await {
                        let cmdline = self.process_ops.command(child).await;
                        if cmdline.contains("opencode") {
                            kill_with_grace(self.process_ops.as_ref(), child).await;
                        }
                    }
                }
            }
        }

        let mut kill_cmd = Command::new(&tmux);
        kill_cmd.args(["kill-pane", "-t", pane_id]);
        let success = run_with_timeout(kill_cmd, TMUX_TIMEOUT, "tmux kill-pane")
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);

        // Decision (open question in the original distillation): always
        // reapply layout, even when kill-pane itself failed, so a single
        // stuck pane never leaves the rest of the window mis-tiled.
        self.apply_layout(cfg).await;

        success
    }

    async fn apply_layout(&self, cfg: &Config) {
        let tmux = self.discover_binary().await;

        let applied = select_layout(&tmux, &cfg.layout).await;
        if !applied {
            select_layout(&tmux, "main-vertical").await;
            return;
        }

        if cfg.layout == "main-horizontal" || cfg.layout == "main-vertical" {
            let mut size_cmd = Command::new(&tmux);
            size_cmd.args([
                "set-window-option",
                "main-pane-size",
                &format!("{}%", cfg.main_pane_size),
            ]);
            let _ = run_with_timeout(size_cmd, TMUX_TIMEOUT, "tmux set-window-option").await;

            if cfg.layout == "main-vertical" {
                select_layout(&tmux, "main-vertical").await;
            }
        }
    }
}

async fn select_layout(tmux: &str, layout: &str) -> bool {
    let mut cmd = Command::new(tmux);
    cmd.args(["select-layout", layout]);
    run_with_timeout(cmd, TMUX_TIMEOUT, "tmux select-layout")
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn probe_health(url: &str) -> bool {
    let client = match reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build() {
        Ok(client) => client,
        Err(_) => return false,
    };
    match tokio::time::timeout(HEALTH_TIMEOUT, client.get(format!("{url}/health")).send()).await {
        Ok(Ok(resp)) => resp.status().is_success(),
        _ => false,
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex as PMutex;

    /// No-op multiplexer adapter: never shells out, drives deterministic
    /// component tests for the spawn queue, session manager and CLI.
    #[derive(Default)]
    pub struct NoOpMultiplexer {
        pub inside: PMutex<bool>,
        pub healthy: PMutex<bool>,
        pub spawn_calls: PMutex<Vec<String>>,
        pub close_calls: PMutex<Vec<String>>,
        pub next_pane_id: PMutex<u64>,
        pub fail_next_spawn: PMutex<bool>,
    }

    impl NoOpMultiplexer {
        pub fn new() -> Self {
            Self {
                inside: PMutex::new(true),
                healthy: PMutex::new(true),
                spawn_calls: PMutex::new(Vec::new()),
                close_calls: PMutex::new(Vec::new()),
                next_pane_id: PMutex::new(1),
                fail_next_spawn: PMutex::new(false),
            }
        }
    }

    #[async_trait]
    impl Multiplexer for NoOpMultiplexer {
        fn inside_multiplexer(&self) -> bool {
            *self.inside.lock()
        }

        async fn host_healthy(&self, _url: &str) -> bool {
            *self.healthy.lock()
        }

        async fn spawn_pane(
            &self,
            session_id: &str,
            _title: &str,
            cfg: &Config,
            url: &str,
            _retry_count: u32,
        ) -> Option<SpawnResult> {
            if !cfg.enabled || !self.inside_multiplexer() || !self.host_healthy(url).await {
                return None;
            }
            self.spawn_calls.lock().push(session_id.to_string());
            if *self.fail_next_spawn.lock() {
                *self.fail_next_spawn.lock() = false;
                return None;
            }
            let mut next = self.next_pane_id.lock();
            let pane_id = format!("%{next}");
            *next += 1;
            Some(SpawnResult { pane_id })
        }

        async fn close_pane(&self, pane_id: &str, _cfg: &Config) -> bool {
            self.close_calls.lock().push(pane_id.to_string());
            true
        }

        async fn apply_layout(&self, _cfg: &Config) {}
    }
}

#[cfg(test)]
mod tests {
    use super::fake::NoOpMultiplexer;
    use super::*;

    #[tokio::test]
    async fn spawn_refused_when_disabled() {
        let mux = NoOpMultiplexer::new();
        let mut cfg = Config::default();
        cfg.enabled = false;
        let result = mux.spawn_pane("s1", "title", &cfg, "http://127.0.0.1:4096", 0).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn spawn_refused_when_host_unhealthy() {
        let mux = NoOpMultiplexer::new();
        *mux.healthy.lock() = false;
        let cfg = Config::default();
        let result = mux.spawn_pane("s1", "title", &cfg, "http://127.0.0.1:4096", 0).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn successful_spawn_returns_a_pane_id() {
        let mux = NoOpMultiplexer::new();
        let cfg = Config::default();
        let result = mux
            .spawn_pane("s1", "title", &cfg, "http://127.0.0.1:4096", 0)
            .await
            .unwrap();
        assert_eq!(result.pane_id, "%1");
    }
}
