// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Zombie reaper: kills orphaned `opencode attach` processes that outlive
//! their session, without ever killing a process belonging to another
//! instance.
//!
//! Safety invariants enforced here, not left to caller discipline: a pid is
//! never killed on a single scan (both a consecutive-check count and a
//! wall-clock grace period must hold), a pid whose target URL does not
//! normalize to this instance's `server_url` is never touched, and a host
//! that is merely unreachable during a periodic scan aborts that scan
//! rather than treating every attach process as a zombie.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentmux_adapters::{kill_with_grace, HostClient, ProcessOps};
use opentmux_core::{same_origin, Clock, ZombieCandidate};
use parking_lot::Mutex;
use tracing::{info, warn};

const ATTACH_PATTERN: &str = "opencode attach";

pub struct ZombieReaper {
    process_ops: Arc<dyn ProcessOps>,
    host_client: Arc<dyn HostClient>,
    clock: Arc<dyn Clock>,
    server_url: String,
    interval: Duration,
    min_zombie_checks: u32,
    grace_period: Duration,
    candidates: Mutex<HashMap<u32, ZombieCandidate>>,
    stopping: AtomicBool,
}

impl ZombieReaper {
    pub fn new(
        process_ops: Arc<dyn ProcessOps>,
        host_client: Arc<dyn HostClient>,
        clock: Arc<dyn Clock>,
        server_url: String,
        interval: Duration,
        min_zombie_checks: u32,
        grace_period: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            process_ops,
            host_client,
            clock,
            server_url,
            interval,
            min_zombie_checks,
            grace_period,
            candidates: Mutex::new(HashMap::new()),
            stopping: AtomicBool::new(false),
        })
    }

    /// Spawn the periodic-scan task: one scan at startup, then one per
    /// `interval` until `shutdown` is called.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.scan_once().await;
            loop {
                tokio::time::sleep(this.interval).await;
                if this.stopping.load(Ordering::SeqCst) {
                    return;
                }
                this.scan_once().await;
            }
        })
    }

    /// Final scan then stop; called from the session manager's shutdown
    /// path. Idempotent: a second call just runs one more scan.
    pub async fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.scan_once().await;
    }

    /// One periodic scan; steps are annotated below.
    pub async fn scan_once(&self) {
        // 1. Enumerate candidate pids; none found clears all state.
        let pids = self.process_ops.find_by_pattern(ATTACH_PATTERN).await;
        if pids.is_empty() {
            self.candidates.lock().clear();
            return;
        }

        // 2. Fetch the host's active session set. Abort the whole scan on
        // failure rather than treating every pid as a zombie.
        let active = match self.host_client.session_status(&self.server_url).await {
            Ok(map) => map,
            Err(err) => {
                warn!(error = %err, "reaper scan aborted: host unreachable");
                return;
            }
        };

        let now = self.clock.now();
        let mut eligible = Vec::new();

        for pid in &pids {
            let cmdline = self.process_ops.command(*pid).await;
            let Some((target_url, session_id)) = parse_attach_cmdline(&cmdline) else {
                continue;
            };

            // 3. Ignore pids belonging to another instance.
            if !same_origin(&target_url, &self.server_url) {
                self.candidates.lock().remove(pid);
                continue;
            }

            // 4. Active session: clear any candidate record.
            if active.0.contains_key(&session_id) {
                self.candidates.lock().remove(pid);
                continue;
            }

            // 5. Otherwise, mark/advance the candidate.
            let mut candidates = self.candidates.lock();
            let candidate = candidates
                .entry(*pid)
                .and_modify(ZombieCandidate::sighted_again)
                .or_insert_with(|| ZombieCandidate::first_sighting(now));

            // 6. Eligible iff both thresholds hold.
            if candidate.is_eligible(now, self.min_zombie_checks, self.grace_period) {
                eligible.push(*pid);
            }
        }

        // 8. Prune candidates for pids no longer enumerated.
        self.candidates
            .lock()
            .retain(|pid, _| pids.contains(pid));

        // 7. Kill eligible pids, dropping their candidate record.
        for pid in eligible {
            info!(pid, "reaping zombie attach process");
            kill_with_grace(self.process_ops.as_ref(), pid).await;
            self.candidates.lock().remove(&pid);
        }
    }

    /// Manual, one-shot global reap (the `opentmux-ctl reap` path):
    /// independent of interval scans, no grace period, and whitelists this
    /// instance's own live sessions so a running daemon never kills itself.
    pub async fn manual_reap(&self, whitelist_session_ids: &[String]) -> u32 {
        let pids = self.process_ops.find_by_pattern(ATTACH_PATTERN).await;
        if pids.is_empty() {
            return 0;
        }

        let mut by_url: HashMap<String, Vec<(u32, String)>> = HashMap::new();
        for pid in pids {
            let cmdline = self.process_ops.command(pid).await;
            if let Some((url, session_id)) = parse_attach_cmdline(&cmdline) {
                by_url.entry(url).or_default().push((pid, session_id));
            }
        }

        let mut killed = 0u32;
        for (url, entries) in by_url {
            let active = match self.host_client.session_status(&url).await {
                Ok(map) => Some(map),
                Err(err) => {
                    warn!(url = %url, error = %err, "reap: host unreachable, killing all its attach clients");
                    None
                }
            };

            for (pid, session_id) in entries {
                if whitelist_session_ids.iter().any(|s| s == &session_id) {
                    continue;
                }
                let is_active = active
                    .as_ref()
                    .map(|m| m.0.contains_key(&session_id))
                    .unwrap_or(false);
                if !is_active {
                    self.process_ops.safe_kill(pid, "-15").await;
                    killed += 1;
                }
            }
        }
        killed
    }
}

/// Extract `(target_url, session_id)` from an `opencode attach <url>
/// --session <id>` command line. The target URL is the first non-flag
/// token after `attach`; the session id follows `--session`.
fn parse_attach_cmdline(cmdline: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = cmdline.split_whitespace().collect();
    let attach_idx = tokens.iter().position(|t| *t == "attach")?;
    let url = tokens[attach_idx + 1..]
        .iter()
        .find(|t| !t.starts_with('-'))?
        .to_string();
    let session_idx = tokens.iter().position(|t| *t == "--session")?;
    let session_id = tokens.get(session_idx + 1)?.to_string();
    Some((url, session_id))
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
