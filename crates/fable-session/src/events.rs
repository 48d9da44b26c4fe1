//! Session event channel

use serde::{Deserialize, Serialize};

use crate::{
    director::DirectorSnapshot,
    escalation::Escalation,
    session::{Message, Scene},
};

/// Ambient presentation hint emitted as a side channel. The core never
/// touches global UI state; an adapter layer applies these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PresentationHint {
    /// Show the latest scene as the conversation backdrop.
    SceneBackdrop { image_url: String },
    ClearBackdrop,
}

/// Events emitted by the session controller. Downstream consumers
/// subscribe to this single channel instead of wiring callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A send was accepted; carries the optimistic user message.
    StreamStart { message: Message },

    /// Incremental assistant text.
    Chunk { delta: String },

    /// The assistant reply was finalized from the `done` content.
    AssistantMessage { message: Message },

    /// An inline instruction card arrived.
    InstructionCard { message: Message },

    /// The director snapshot advanced.
    DirectorUpdate { snapshot: DirectorSnapshot },

    /// The server suggested offering a "visualize" action for this beat.
    SceneSuggested,

    /// A scene generation request went pending.
    ScenePending,

    /// A scene resolved and joined the history.
    SceneReady { scene: Scene },

    /// The pending scene request failed.
    SceneFailed { reason: String },

    /// The episode reached narrative completion.
    EpisodeComplete { snapshot: DirectorSnapshot },

    /// A failure was routed to its surface.
    Escalate { escalation: Escalation },

    /// Ambient presentation side channel.
    PresentationHint { hint: PresentationHint },

    /// The reply stream finished, successfully or not.
    StreamEnd,

    /// Generic error surfaced non-blockingly.
    Error { message: String },
}

impl SessionEvent {
    /// Check if this event ends the current send.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::StreamEnd | SessionEvent::Error { .. })
    }
}
