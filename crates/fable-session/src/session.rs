//! Core session data model

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Distinguishes dialogue from inline instruction cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Dialogue,
    Instruction,
}

/// One finalized conversation message. Immutable once created; the
/// in-flight assistant reply lives in the controller's streaming buffer
/// until it is promoted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: String,
    pub role: Role,
    pub kind: MessageKind,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl Message {
    /// Create an optimistic user message at send time.
    pub fn user(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::User, MessageKind::Dialogue, content)
    }

    /// Create a finalized assistant message from the `done` content.
    pub fn assistant(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::Assistant, MessageKind::Dialogue, content)
    }

    /// Create an inline instruction card.
    pub fn instruction(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::Assistant, MessageKind::Instruction, content)
    }

    fn new(
        session_id: impl Into<String>,
        role: Role,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            role,
            kind,
            content: content.into(),
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// What caused a scene to be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneTrigger {
    /// Explicit user "visualize" action.
    UserRequest,
    /// Server-initiated visual from the text stream.
    DirectorHint,
}

/// A generated image tied to a point in the conversation. Only created
/// when a generation request resolved successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: Uuid,
    pub session_id: String,
    /// Monotonically increasing within a session.
    pub sequence: u32,
    pub image_url: String,
    pub caption: Option<String>,
    pub trigger: SceneTrigger,
    /// User-curated keep/discard flag.
    pub memory: bool,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// One ongoing scripted conversation instance for a (user, character)
/// pair. Narrative progress lives in the director snapshot; the session
/// carries identity and the explicit-termination flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub character_id: String,
    pub episode_id: String,
    /// Set by `episode_complete` or an explicit end; terminal.
    pub completed: bool,
}
