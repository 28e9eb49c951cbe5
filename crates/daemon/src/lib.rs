// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opentmux Daemon library
//!
//! Exposes the IPC protocol types, the four coordination subsystems, and
//! the lifecycle/env helpers for use by `opentmux-ctl` and integration
//! tests. `main.rs` is a thin wiring layer over this crate.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod protocol;
pub mod protocol_wire;
pub mod reaper;
pub mod session_manager;
pub mod spawn_queue;

pub use lifecycle::{LifecycleError, StartupResult};
pub use listener::{ListenCtx, Listener};
pub use protocol::{Request, Response};
pub use protocol_wire::{
    decode, encode, read_request, write_response, ProtocolError, DEFAULT_TIMEOUT,
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
pub use reaper::ZombieReaper;
pub use session_manager::SessionManager;
pub use spawn_queue::SpawnQueue;
