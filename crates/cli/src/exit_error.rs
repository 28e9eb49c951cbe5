// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exit-code mapping for the control CLI: 0 success, 1 generic failure, 2
//! usage error.

use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

impl ExitError {
    pub fn usage(message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(ExitError {
            code: 2,
            message: message.into(),
        })
    }

    pub fn failure(message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(ExitError {
            code: 1,
            message: message.into(),
        })
    }
}
