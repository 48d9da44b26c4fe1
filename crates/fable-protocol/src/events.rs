//! Typed events decoded from the reply stream

use serde::{Deserialize, Serialize};

use crate::types::{CompletionTrigger, DirectorUpdate, Evaluation, NextEpisode, VisualKind};

/// One decoded frame from the reply stream.
///
/// Field names match the wire payloads exactly; the `type` tag on each
/// frame selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text.
    Chunk { content: String },

    /// The finalized reply text. `content` is authoritative and may
    /// differ from the concatenation of the preceding chunks.
    Done {
        content: String,
        #[serde(default)]
        suggest_scene: bool,
        episode_id: String,
        #[serde(default)]
        director: Option<DirectorUpdate>,
    },

    /// A scene generation was accepted server-side and sparks were
    /// already deducted.
    VisualPending {
        visual_type: VisualKind,
        #[serde(default)]
        visual_hint: Option<String>,
        sparks_deducted: u32,
    },

    /// The generated image for an in-flight visual.
    VisualReady {
        image_url: String,
        #[serde(default)]
        caption: Option<String>,
    },

    /// A non-dialogue informational beat to render inline.
    InstructionCard { content: String },

    /// A requested visual could not be started for lack of sparks.
    NeedsSparks { message: String },

    /// Narrative completion of the episode.
    EpisodeComplete {
        turn_count: u32,
        trigger: CompletionTrigger,
        #[serde(default)]
        next_suggestion: Option<NextEpisode>,
        #[serde(default)]
        evaluation: Option<Evaluation>,
    },
}

impl StreamEvent {
    /// Event kind name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Done { .. } => "done",
            StreamEvent::VisualPending { .. } => "visual_pending",
            StreamEvent::VisualReady { .. } => "visual_ready",
            StreamEvent::InstructionCard { .. } => "instruction_card",
            StreamEvent::NeedsSparks { .. } => "needs_sparks",
            StreamEvent::EpisodeComplete { .. } => "episode_complete",
        }
    }
}
