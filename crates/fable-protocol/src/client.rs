//! HTTP client for the conversation API

use reqwest_eventsource::EventSource;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use crate::{
    error::{Error, Result},
    types::{CreditCheck, GeneratedScene, SceneRequest, SessionInfo},
};

/// Timeout for out-of-band scene generation. The text stream itself has
/// no client-side timeout; the server turn budget bounds it.
const SCENE_TIMEOUT: Duration = Duration::from_secs(60);

/// Authenticated client for the conversation API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    /// Create a client with a bearer credential.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    /// Open the reply stream for one outgoing message.
    ///
    /// The returned source is consumed through [`crate::decoder::decode`];
    /// dropping or closing it closes the connection.
    pub fn open_reply_stream(&self, character_id: &str, content: &str) -> Result<EventSource> {
        let url = format!(
            "{}/conversation/{}/send/stream",
            self.base_url, character_id
        );
        let builder = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "content": content }));
        EventSource::new(builder)
            .map_err(|e| Error::Sse(format!("failed to open event source: {}", e)))
    }

    /// Generate a scene out-of-band (the "quick scene" flow).
    pub async fn generate_scene(&self, request: &SceneRequest) -> Result<GeneratedScene> {
        let url = format!("{}/scenes/generate", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .timeout(SCENE_TIMEOUT)
            .json(request)
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Check whether the user can afford a spark-consuming action.
    pub async fn check_credits(&self, cost: u32) -> Result<CreditCheck> {
        let url = format!("{}/credits/check?cost={}", self.base_url, cost);
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        Self::read_json(response).await
    }

    /// Resolve or create the active session for a character.
    pub async fn resolve_session(
        &self,
        character_id: &str,
        episode_template: Option<&str>,
    ) -> Result<SessionInfo> {
        let url = format!("{}/conversation/{}/session", self.base_url, character_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "episode_template": episode_template }))
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Erase the session/message/scene history for a character pair.
    /// Destructive; confirmation is gated upstream.
    pub async fn erase_history(&self, character_id: &str) -> Result<()> {
        let url = format!("{}/conversation/{}/history", self.base_url, character_id);
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let retry_after = parse_retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        Err(Error::from_response(status.as_u16(), retry_after, &body))
    }

    /// Decode a JSON body, mapping tagged error bodies to typed errors.
    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let retry_after = parse_retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        Err(Error::from_response(status.as_u16(), retry_after, &body))
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
