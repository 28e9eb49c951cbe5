// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The non-waiter-bearing half of a spawn queue item. The daemon crate
//! wraps this with its `tokio::sync::oneshot` waiter list, which needs the
//! async runtime and so cannot live in this crate.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct QueueItemInfo {
    pub session_id: String,
    pub title: String,
    pub enqueued_at: Instant,
}

impl QueueItemInfo {
    pub fn is_stale(&self, now: Instant, stale_threshold: std::time::Duration) -> bool {
        now.saturating_duration_since(self.enqueued_at) > stale_threshold
    }
}

/// Outcome of a spawn attempt, as reported back to every waiter coalesced
/// onto the same queue item.
#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    pub success: bool,
    pub pane_id: Option<String>,
}

impl SpawnOutcome {
    pub fn failure() -> Self {
        Self {
            success: false,
            pane_id: None,
        }
    }

    pub fn success(pane_id: String) -> Self {
        Self {
            success: true,
            pane_id: Some(pane_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn staleness_is_threshold_exclusive() {
        let now = Instant::now();
        let item = QueueItemInfo {
            session_id: "s1".into(),
            title: "t".into(),
            enqueued_at: now,
        };
        assert!(!item.is_stale(now + Duration::from_secs(30), Duration::from_secs(30)));
        assert!(item.is_stale(now + Duration::from_millis(30_001), Duration::from_secs(30)));
    }
}
