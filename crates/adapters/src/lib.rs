// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: process introspection, the multiplexer
//! binary, and the host's HTTP surface. Everything that shells out or
//! makes a network call lives in this crate.

pub mod host;
pub mod multiplexer;
pub mod process;
pub mod subprocess;

pub use host::{HostClient, HostError, ReqwestHostClient, SessionStatusEntry, SessionStatusMap};
pub use multiplexer::{Multiplexer, SpawnResult, TmuxMultiplexer};
pub use process::{kill_with_grace, ProcessOps, SystemProcessOps};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use host::fake::FakeHostClient;
#[cfg(any(test, feature = "test-support"))]
pub use multiplexer::fake::NoOpMultiplexer;
#[cfg(any(test, feature = "test-support"))]
pub use process::fake::{FakeProcess, FakeProcessOps};
