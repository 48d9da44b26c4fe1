//! Backend seam between the session layer and the network

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fable_protocol::{
    ApiClient, Result,
    decoder::{EventStream, decode},
    types::{CreditCheck, GeneratedScene, SceneRequest, SessionInfo},
};

/// Network surface consumed by the session controller. The HTTP client
/// implements it; tests substitute a scripted mock.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open the decoded event stream for one outgoing message. The
    /// cancellation token must close the transport when fired.
    async fn stream_reply(
        &self,
        character_id: &str,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<EventStream>;

    /// Out-of-band scene generation.
    async fn generate_scene(&self, request: &SceneRequest) -> Result<GeneratedScene>;

    /// Resolve or create the active session for a character.
    async fn resolve_session(
        &self,
        character_id: &str,
        episode_template: Option<&str>,
    ) -> Result<SessionInfo>;

    /// Credit balance check, read fresh before every spark-consuming
    /// action.
    async fn check_credits(&self, cost: u32) -> Result<CreditCheck>;

    /// Destructive relationship reset.
    async fn erase_history(&self, character_id: &str) -> Result<()>;
}

#[async_trait]
impl Backend for ApiClient {
    async fn stream_reply(
        &self,
        character_id: &str,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        let source = self.open_reply_stream(character_id, content)?;
        Ok(decode(source, cancel))
    }

    async fn generate_scene(&self, request: &SceneRequest) -> Result<GeneratedScene> {
        ApiClient::generate_scene(self, request).await
    }

    async fn resolve_session(
        &self,
        character_id: &str,
        episode_template: Option<&str>,
    ) -> Result<SessionInfo> {
        ApiClient::resolve_session(self, character_id, episode_template).await
    }

    async fn check_credits(&self, cost: u32) -> Result<CreditCheck> {
        ApiClient::check_credits(self, cost).await
    }

    async fn erase_history(&self, character_id: &str) -> Result<()> {
        ApiClient::erase_history(self, character_id).await
    }
}
