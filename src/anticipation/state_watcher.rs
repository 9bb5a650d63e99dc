//! `StateWatcher`: the subscribe-to-state-changes / get-entity-state
//! interface the Anticipation Engine depends on (spec §4.1 Non-goals: only
//! this interface is used, the platform itself is an external collaborator).
//!
//! Grounded in the teacher's trait-per-collaborator pattern (`LlmProvider`,
//! `Channel`): a narrow async trait with one production-shaped
//! implementation and one in-memory mock for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;

/// Subscribe-to-state-changes / get-entity-state interface against a
/// smart-home platform (spec §6 "State-change subscription").
#[async_trait]
pub trait StateWatcher: Send + Sync {
    /// Current state string for an entity (best-effort fetch).
    async fn get_state(&self, entity_id: &str) -> Result<String>;
}

/// In-memory `StateWatcher` for tests: states are fixed at construction or
/// set explicitly, and `get_state` never fails.
#[derive(Default)]
pub struct MockStateWatcher {
    states: Mutex<HashMap<String, String>>,
}

impl MockStateWatcher {
    pub fn with_states(states: HashMap<String, String>) -> Self {
        MockStateWatcher {
            states: Mutex::new(states),
        }
    }

    pub fn set_state(&self, entity_id: &str, state: &str) {
        self.states.lock().unwrap().insert(entity_id.to_string(), state.to_string());
    }
}

#[async_trait]
impl StateWatcher for MockStateWatcher {
    async fn get_state(&self, entity_id: &str) -> Result<String> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(entity_id)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string()))
    }
}

/// Production `StateWatcher`: a long-poll REST client against a
/// Home-Assistant-like state API (`GET {base_url}/api/states/{entity_id}`).
pub struct HttpStateWatcher {
    client: reqwest::Client,
    base_url: String,
    token: secrecy::SecretString,
}

impl HttpStateWatcher {
    pub fn new(base_url: impl Into<String>, token: secrecy::SecretString) -> Self {
        HttpStateWatcher {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }
}

#[async_trait]
impl StateWatcher for HttpStateWatcher {
    async fn get_state(&self, entity_id: &str) -> Result<String> {
        use secrecy::ExposeSecret;

        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        let body: serde_json::Value = response.json().await?;
        Ok(body
            .get("state")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_set_state() {
        let watcher = MockStateWatcher::default();
        watcher.set_state("light.kitchen", "on");
        assert_eq!(watcher.get_state("light.kitchen").await.unwrap(), "on");
    }

    #[tokio::test]
    async fn test_mock_returns_unknown_for_unset_entity() {
        let watcher = MockStateWatcher::default();
        assert_eq!(watcher.get_state("light.bedroom").await.unwrap(), "unknown");
    }
}
