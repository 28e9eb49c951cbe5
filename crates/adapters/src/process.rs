// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS-side process primitives used by the zombie reaper and the pane
//! lifecycle controller. Side-effect-limited to signalling/process queries;
//! none of these raise — callers get sentinel empties on failure, matching
//! the "never crash over a missing/mortal process" posture of the reaper.

use crate::subprocess::{run_with_timeout, KILL_GRACE_PERIOD, PROCESS_QUERY_TIMEOUT};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

#[async_trait]
pub trait ProcessOps: Send + Sync {
    async fn is_alive(&self, pid: u32) -> bool;
    async fn command(&self, pid: u32) -> String;
    async fn children(&self, pid: u32) -> Vec<u32>;
    async fn listening_pids(&self, port: u16) -> Vec<u32>;
    async fn find_by_pattern(&self, pattern: &str) -> Vec<u32>;
    async fn safe_kill(&self, pid: u32, signal: &str) -> bool;
    async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool;
}

#[derive(Clone, Copy, Default)]
pub struct SystemProcessOps;

impl SystemProcessOps {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessOps for SystemProcessOps {
    /// True iff a null-signal probe succeeds.
    async fn is_alive(&self, pid: u32) -> bool {
        self.safe_kill(pid, "-0").await
    }

    /// The full command line, empty on failure.
    async fn command(&self, pid: u32) -> String {
        let mut cmd = Command::new("ps");
        cmd.args(["-p", &pid.to_string(), "-o", "command="]);
        match run_with_timeout(cmd, PROCESS_QUERY_TIMEOUT, "ps").await {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            _ => String::new(),
        }
    }

    /// Immediate child pids; empty on non-POSIX or failure.
    async fn children(&self, pid: u32) -> Vec<u32> {
        let mut cmd = Command::new("pgrep");
        cmd.args(["-P", &pid.to_string()]);
        match run_with_timeout(cmd, PROCESS_QUERY_TIMEOUT, "pgrep -P").await {
            Ok(output) if output.status.success() => parse_pids(&output.stdout),
            _ => Vec::new(),
        }
    }

    /// Pids listening on `port`; empty on non-POSIX or failure.
    async fn listening_pids(&self, port: u16) -> Vec<u32> {
        let mut cmd = Command::new("lsof");
        cmd.args(["-t", &format!("-iTCP:{port}"), "-sTCP:LISTEN"]);
        match run_with_timeout(cmd, PROCESS_QUERY_TIMEOUT, "lsof").await {
            Ok(output) if output.status.success() => parse_pids(&output.stdout),
            _ => Vec::new(),
        }
    }

    /// Pids whose full command line matches `pattern`; empty on non-POSIX.
    async fn find_by_pattern(&self, pattern: &str) -> Vec<u32> {
        let mut cmd = Command::new("pgrep");
        cmd.args(["-f", pattern]);
        match run_with_timeout(cmd, PROCESS_QUERY_TIMEOUT, "pgrep -f").await {
            Ok(output) if output.status.success() => parse_pids(&output.stdout),
            _ => Vec::new(),
        }
    }

    /// Send `signal`; true also when the process is already gone.
    async fn safe_kill(&self, pid: u32, signal: &str) -> bool {
        let mut cmd = Command::new("kill");
        cmd.args([signal, &pid.to_string()]);
        match run_with_timeout(cmd, PROCESS_QUERY_TIMEOUT, "kill").await {
            Ok(output) if output.status.success() => true,
            // `kill` exits non-zero for a pid that no longer exists (ESRCH);
            // that is a successful outcome from the caller's point of view.
            _ => !self.is_alive(pid).await,
        }
    }

    /// Poll until dead or timeout; default timeout 2s.
    async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let start = tokio::time::Instant::now();
        loop {
            if !self.is_alive(pid).await {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Escalating kill: SIGTERM, then SIGKILL after `KILL_GRACE_PERIOD` if still
/// alive. Shared by ClosePane and the zombie reaper.
pub async fn kill_with_grace(ops: &dyn ProcessOps, pid: u32) {
    ops.safe_kill(pid, "-15").await;
    if !ops.wait_for_exit(pid, KILL_GRACE_PERIOD).await {
        ops.safe_kill(pid, "-9").await;
    }
}

fn parse_pids(stdout: &[u8]) -> Vec<u32> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Default)]
    pub struct FakeProcess {
        pub command: String,
        pub alive: bool,
        pub children: Vec<u32>,
    }

    /// In-memory `ProcessOps` double: no subprocesses, fully deterministic.
    #[derive(Default)]
    pub struct FakeProcessOps {
        pub processes: Mutex<HashMap<u32, FakeProcess>>,
        pub killed: Mutex<Vec<(u32, String)>>,
    }

    impl FakeProcessOps {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, pid: u32, process: FakeProcess) {
            self.processes.lock().insert(pid, process);
        }
    }

    #[async_trait]
    impl ProcessOps for FakeProcessOps {
        async fn is_alive(&self, pid: u32) -> bool {
            self.processes.lock().get(&pid).map(|p| p.alive).unwrap_or(false)
        }

        async fn command(&self, pid: u32) -> String {
            self.processes
                .lock()
                .get(&pid)
                .map(|p| p.command.clone())
                .unwrap_or_default()
        }

        async fn children(&self, pid: u32) -> Vec<u32> {
            self.processes
                .lock()
                .get(&pid)
                .map(|p| p.children.clone())
                .unwrap_or_default()
        }

        async fn listening_pids(&self, _port: u16) -> Vec<u32> {
            Vec::new()
        }

        async fn find_by_pattern(&self, pattern: &str) -> Vec<u32> {
            self.processes
                .lock()
                .iter()
                .filter(|(_, p)| p.command.contains(pattern))
                .map(|(pid, _)| *pid)
                .collect()
        }

        async fn safe_kill(&self, pid: u32, signal: &str) -> bool {
            self.killed.lock().push((pid, signal.to_string()));
            if let Some(p) = self.processes.lock().get_mut(&pid) {
                p.alive = false;
            }
            true
        }

        async fn wait_for_exit(&self, pid: u32, _timeout: Duration) -> bool {
            !self.is_alive(pid).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeProcess, FakeProcessOps};
    use super::*;

    #[tokio::test]
    async fn kill_with_grace_sends_sigterm_first() {
        let ops = FakeProcessOps::new();
        ops.insert(
            7,
            FakeProcess {
                command: "opencode attach http://127.0.0.1:4096 --session s1".into(),
                alive: true,
                children: vec![],
            },
        );
        kill_with_grace(&ops, 7).await;
        let killed = ops.killed.lock();
        assert_eq!(killed.first().map(|(_, sig)| sig.as_str()), Some("-15"));
    }

    #[tokio::test]
    async fn find_by_pattern_matches_full_command_line() {
        let ops = FakeProcessOps::new();
        ops.insert(
            9,
            FakeProcess {
                command: "opencode attach http://127.0.0.1:4096 --session s1".into(),
                alive: true,
                children: vec![],
            },
        );
        let found = ops.find_by_pattern("opencode attach").await;
        assert_eq!(found, vec![9]);
    }

    #[test]
    fn parse_pids_ignores_blank_lines() {
        assert_eq!(parse_pids(b"12\n\n34\n"), vec![12, 34]);
    }
}
