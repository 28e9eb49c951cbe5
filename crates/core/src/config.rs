// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: normalized, validated tunables with defaults.
//!
//! `Config` is the fully-defaulted, immutable struct every component reads.
//! `RawConfig` is its `serde`-deserialized counterpart with every field
//! `Option<T>` so unknown or missing keys never fail parsing; `Normalize`
//! folds a `RawConfig` onto `Config::default()`, clamping ranges.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: layout must not be empty after normalization")]
    EmptyLayout,
}

/// Immutable, fully-defaulted daemon configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub enabled: bool,
    pub server_url: String,
    pub layout: String,
    pub main_pane_size: u32,
    pub max_agents_per_column: u32,
    pub spawn_delay_ms: u64,
    pub max_retry_attempts: u32,
    pub layout_debounce_ms: u64,
    pub reaper_enabled: bool,
    pub reaper_interval_ms: u64,
    pub reaper_min_zombie_checks: u32,
    pub reaper_grace_period_ms: u64,
    pub rotate_port: bool,
    pub max_ports: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            server_url: String::new(),
            layout: "main-vertical".to_string(),
            main_pane_size: 60,
            max_agents_per_column: 4,
            spawn_delay_ms: 300,
            max_retry_attempts: 2,
            layout_debounce_ms: 150,
            reaper_enabled: true,
            reaper_interval_ms: 30_000,
            reaper_min_zombie_checks: 3,
            reaper_grace_period_ms: 5_000,
            rotate_port: false,
            max_ports: 10,
        }
    }
}

const VALID_LAYOUTS: &[&str] = &[
    "main-horizontal",
    "main-vertical",
    "tiled",
    "even-horizontal",
    "even-vertical",
];

/// Wire/file representation: every field optional so unknown keys and
/// partial files are never a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    pub enabled: Option<bool>,
    #[serde(rename = "serverUrl")]
    pub server_url: Option<String>,
    pub layout: Option<String>,
    #[serde(rename = "mainPaneSize")]
    pub main_pane_size: Option<u32>,
    #[serde(rename = "maxAgentsPerColumn")]
    pub max_agents_per_column: Option<u32>,
    #[serde(rename = "spawnDelayMs")]
    pub spawn_delay_ms: Option<u64>,
    #[serde(rename = "maxRetryAttempts")]
    pub max_retry_attempts: Option<u32>,
    #[serde(rename = "layoutDebounceMs")]
    pub layout_debounce_ms: Option<u64>,
    #[serde(rename = "reaperEnabled")]
    pub reaper_enabled: Option<bool>,
    #[serde(rename = "reaperIntervalMs")]
    pub reaper_interval_ms: Option<u64>,
    #[serde(rename = "reaperMinZombieChecks")]
    pub reaper_min_zombie_checks: Option<u32>,
    #[serde(rename = "reaperGracePeriodMs")]
    pub reaper_grace_period_ms: Option<u64>,
    #[serde(rename = "rotatePort")]
    pub rotate_port: Option<bool>,
    #[serde(rename = "maxPorts")]
    pub max_ports: Option<u32>,
}

fn clamp_or_default<T: PartialOrd + Copy>(value: Option<T>, min: T, max: T, default: T) -> T {
    match value {
        Some(v) if v >= min && v <= max => v,
        _ => default,
    }
}

impl Config {
    /// Search order: `<dir>/opentmux.json`, `<dir>/opencode-agent-tmux.json`
    /// (legacy), then `$HOME/.config/opencode/opentmux.json`. First existing,
    /// parseable file wins; parse failure is logged and defaults are used.
    pub fn load_from_directory(dir: &Path) -> Config {
        let candidates = [
            dir.join("opentmux.json"),
            dir.join("opencode-agent-tmux.json"),
            dirs_home_config(),
        ];
        for path in candidates.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(text) => match Config::parse_from_string(&text) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "failed to parse config, falling back to defaults");
                        return Config::default();
                    }
                },
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to read config, falling back to defaults");
                    return Config::default();
                }
            }
        }
        Config::default()
    }

    pub fn parse_from_string(text: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        Ok(Config::default().merge(raw))
    }

    /// Fold `raw` onto `self`, clamping ranges and substituting defaults for
    /// missing or out-of-range fields.
    pub fn merge(&self, raw: RawConfig) -> Config {
        let defaults = Config::default();
        let layout = raw
            .layout
            .filter(|l| VALID_LAYOUTS.contains(&l.as_str()))
            .unwrap_or(self.layout.clone());
        Config {
            enabled: raw.enabled.unwrap_or(self.enabled),
            server_url: raw.server_url.unwrap_or_else(|| self.server_url.clone()),
            layout,
            main_pane_size: clamp_or_default(
                raw.main_pane_size,
                20,
                80,
                defaults.main_pane_size,
            ),
            max_agents_per_column: clamp_or_default(
                raw.max_agents_per_column,
                1,
                10,
                defaults.max_agents_per_column,
            ),
            spawn_delay_ms: clamp_or_default(raw.spawn_delay_ms, 50, 2000, defaults.spawn_delay_ms),
            max_retry_attempts: clamp_or_default(
                raw.max_retry_attempts,
                0,
                5,
                defaults.max_retry_attempts,
            ),
            layout_debounce_ms: clamp_or_default(
                raw.layout_debounce_ms,
                50,
                1000,
                defaults.layout_debounce_ms,
            ),
            reaper_enabled: raw.reaper_enabled.unwrap_or(self.reaper_enabled),
            reaper_interval_ms: raw.reaper_interval_ms.unwrap_or(self.reaper_interval_ms),
            reaper_min_zombie_checks: raw
                .reaper_min_zombie_checks
                .unwrap_or(self.reaper_min_zombie_checks),
            reaper_grace_period_ms: raw
                .reaper_grace_period_ms
                .unwrap_or(self.reaper_grace_period_ms),
            rotate_port: raw.rotate_port.unwrap_or(self.rotate_port),
            max_ports: clamp_or_default(raw.max_ports, 1, 100, defaults.max_ports),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layout.is_empty() {
            return Err(ConfigError::EmptyLayout);
        }
        Ok(())
    }
}

fn dirs_home_config() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(|home| {
        Path::new(&home)
            .join(".config")
            .join("opencode")
            .join("opentmux.json")
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
