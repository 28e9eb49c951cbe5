// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for control-service communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload (see
//! `protocol_wire`). Method set: Init, OnSessionCreated, Shutdown, Stats,
//! and the manual-reap CLI surface.

use opentmux_core::RawConfig;
use serde::{Deserialize, Serialize};

/// Request from `opentmux-ctl` (or the host plugin shim) to `opentmuxd`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Exactly one `Init` is honored per process; subsequent Inits error.
    Init {
        directory: String,
        server_url: String,
        overrides: Option<RawConfig>,
    },

    /// The only event shape the control boundary accepts.
    ///
    /// `event_type` is deliberately not renamed to `"type"` on the wire:
    /// this enum is internally tagged with `tag = "type"`, so a field named
    /// `"type"` would collide with the variant tag and make every
    /// `OnSessionCreated` message undecodable.
    OnSessionCreated {
        event_type: String,
        id: String,
        parent_id: String,
        title: String,
    },

    /// Always idempotent; fires the daemon's shutdown path exactly once
    /// per call, even when already shutting down.
    Shutdown { reason: String },

    /// Valid before Init (returns all-zero counters).
    Stats,

    /// The manual, independent-of-interval-scans global reap operation.
    Reap,
}

/// Response from `opentmuxd` to its caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Init { enabled: bool, message: String },
    OnSessionCreated { accepted: bool },
    Shutdown { ok: bool },
    Stats {
        tracked_sessions: u64,
        pending_sessions: u64,
        queue_depth: u64,
    },
    Reap { killed: u32 },
    Error { message: String },
}

impl Request {
    /// `Stats` logs at debug; every mutating call logs at info.
    pub fn is_query(&self) -> bool {
        matches!(self, Request::Stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_round_trips_through_json() {
        let req = Request::Init {
            directory: "/tmp".into(),
            server_url: "http://127.0.0.1:4096".into(),
            overrides: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn stats_is_a_query_but_shutdown_is_not() {
        assert!(Request::Stats.is_query());
        assert!(!Request::Shutdown { reason: "test".into() }.is_query());
    }

    #[test]
    fn response_tag_uses_declared_variant_names() {
        let resp = Response::OnSessionCreated { accepted: true };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "OnSessionCreated");
        assert_eq!(json["accepted"], true);
    }
}
