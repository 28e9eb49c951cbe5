// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host HTTP client: `GET <serverUrl>/session/status`, consumed by both the
//! session manager's poller and the zombie reaper's periodic scan.

use crate::subprocess::SESSION_STATUS_TIMEOUT;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected status: {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatusEntry {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStatusMap(pub HashMap<String, SessionStatusEntry>);

#[derive(Debug, Deserialize)]
struct Enveloped {
    data: Option<HashMap<String, SessionStatusEntry>>,
}

#[async_trait]
pub trait HostClient: Send + Sync {
    async fn session_status(&self, server_url: &str) -> Result<SessionStatusMap, HostError>;
}

#[derive(Clone)]
pub struct ReqwestHostClient {
    client: reqwest::Client,
}

impl ReqwestHostClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SESSION_STATUS_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for ReqwestHostClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostClient for ReqwestHostClient {
    async fn session_status(&self, server_url: &str) -> Result<SessionStatusMap, HostError> {
        let url = format!("{server_url}/session/status");
        let resp = tokio::time::timeout(SESSION_STATUS_TIMEOUT, self.client.get(&url).send())
            .await
            .map_err(|_| HostError::Timeout)??;

        if !resp.status().is_success() {
            return Err(HostError::Status(resp.status().as_u16()));
        }

        let text = resp.text().await?;
        Ok(parse_session_status(&text))
    }
}

/// The host is tolerant of two response shapes: `{"data": {...}}` (primary)
/// and a bare top-level object whose keys are session ids (secondary
/// interpretation, used only when `data` is absent). Both the poller and
/// the reaper go through this single parser so the two components can
/// never disagree about which session ids are "active".
fn parse_session_status(text: &str) -> SessionStatusMap {
    if let Ok(enveloped) = serde_json::from_str::<Enveloped>(text) {
        if let Some(data) = enveloped.data {
            return SessionStatusMap(data);
        }
    }
    if let Ok(bare) = serde_json::from_str::<HashMap<String, SessionStatusEntry>>(text) {
        return SessionStatusMap(bare);
    }
    SessionStatusMap::default()
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;

    pub struct FakeHostClient {
        pub response: Mutex<Result<SessionStatusMap, String>>,
    }

    impl Default for FakeHostClient {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FakeHostClient {
        pub fn new() -> Self {
            Self {
                response: Mutex::new(Ok(SessionStatusMap::default())),
            }
        }

        pub fn set_active(&self, sessions: &[(&str, &str)]) {
            let map = sessions
                .iter()
                .map(|(id, kind)| {
                    (
                        id.to_string(),
                        SessionStatusEntry {
                            kind: kind.to_string(),
                        },
                    )
                })
                .collect();
            *self.response.lock() = Ok(SessionStatusMap(map));
        }

        pub fn fail(&self) {
            *self.response.lock() = Err("unreachable".to_string());
        }
    }

    #[async_trait]
    impl HostClient for FakeHostClient {
        async fn session_status(&self, _server_url: &str) -> Result<SessionStatusMap, HostError> {
            match &*self.response.lock() {
                Ok(map) => Ok(SessionStatusMap(map.0.clone())),
                Err(_) => Err(HostError::Status(503)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_enveloped_data_shape() {
        let map = parse_session_status(r#"{"data": {"s1": {"type": "idle"}}}"#);
        assert_eq!(map.0.get("s1").unwrap().kind, "idle");
    }

    #[test]
    fn falls_back_to_bare_top_level_keys_when_data_missing() {
        let map = parse_session_status(r#"{"s1": {"type": "idle"}}"#);
        assert_eq!(map.0.get("s1").unwrap().kind, "idle");
    }

    #[test]
    fn unparseable_body_yields_empty_map() {
        let map = parse_session_status("not json");
        assert!(map.0.is_empty());
    }
}
