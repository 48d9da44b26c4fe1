//! Domain types carried on the wire

use serde::{Deserialize, Serialize};

/// Narrative progress status reported by the director.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorStatus {
    Going,
    Closing,
    Done,
}

/// Pacing phase of the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingPhase {
    Establish,
    Develop,
    Escalate,
    Peak,
    Resolve,
}

/// What caused the episode to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTrigger {
    /// The director detected a narrative ending.
    Semantic,
    /// The turn budget ran out.
    TurnLimit,
    Unknown,
}

/// Director payload attached to a `done` event.
///
/// The server may omit this on cheap turns; a missing payload leaves
/// the tracked snapshot unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorUpdate {
    pub turn_count: u32,
    /// `None` means the episode is unbounded.
    pub turns_remaining: Option<u32>,
    pub is_complete: bool,
    pub status: DirectorStatus,
    pub pacing: PacingPhase,
}

/// Kind of visual the server decided to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    Character,
    Object,
    Atmosphere,
}

/// Suggested follow-up episode attached to `episode_complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextEpisode {
    pub episode_id: String,
    pub title: String,
    pub slug: String,
    pub episode_number: u32,
    pub situation: String,
    pub character_id: String,
}

/// Shareable evaluation payload for a finished conversation.
///
/// The scoring service is external; the result is carried opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub evaluation_type: String,
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_id: Option<String>,
}

/// Request body for `POST /scenes/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct SceneRequest {
    pub episode_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_mode: Option<String>,
}

/// Response body of `POST /scenes/generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedScene {
    pub image_id: String,
    pub image_url: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Credit balance check for a spark-consuming action.
///
/// The balance mutates server-side, so this is read before every
/// credit-consuming action and never cached.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditCheck {
    pub balance: u32,
    pub cost: u32,
    pub allowed: bool,
}

/// Server-side view of a resolved or newly created session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub character_id: String,
    pub episode_id: String,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default)]
    pub turns_remaining: Option<u32>,
    #[serde(default)]
    pub is_complete: bool,
    /// Spark cost to unlock the episode template, if it is premium.
    #[serde(default)]
    pub required_sparks: Option<u32>,
}
