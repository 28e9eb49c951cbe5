// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide atomic counters, snapshot-able by the control surface.
//! Readers get no cross-field coherence; this is eventually consistent by
//! design, not by oversight.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    tracked_sessions: AtomicU64,
    pending_sessions: AtomicU64,
    queue_depth: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub tracked_sessions: u64,
    pub pending_sessions: u64,
    pub queue_depth: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tracked_sessions(&self, v: u64) {
        self.tracked_sessions.store(v, Ordering::Relaxed);
    }

    pub fn set_pending_sessions(&self, v: u64) {
        self.pending_sessions.store(v, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, v: u64) {
        self.queue_depth.store(v, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tracked_sessions: self.tracked_sessions.load(Ordering::Relaxed),
            pending_sessions: self.pending_sessions.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_sets() {
        let m = Metrics::new();
        m.set_tracked_sessions(2);
        m.set_pending_sessions(1);
        m.set_queue_depth(3);
        let snap = m.snapshot();
        assert_eq!(snap.tracked_sessions, 2);
        assert_eq!(snap.pending_sessions, 1);
        assert_eq!(snap.queue_depth, 3);
    }
}
