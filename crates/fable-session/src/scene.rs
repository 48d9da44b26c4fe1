//! Scene generation lifecycle

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    session::{Scene, SceneTrigger},
};

/// How a user-requested scene should be generated. Each mode carries its
/// own spark cost and input requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Quick scene from the current conversation context.
    Snapshot,
    /// Character portrait anchored to a reference image.
    Portrait,
    /// Ambient shot of the surroundings, no character in frame.
    Atmosphere,
}

impl GenerationMode {
    /// Spark cost deducted when the request is accepted.
    pub fn spark_cost(&self) -> u32 {
        match self {
            GenerationMode::Snapshot => 5,
            GenerationMode::Portrait => 12,
            GenerationMode::Atmosphere => 8,
        }
    }

    /// Whether the mode needs a character reference anchor image.
    pub fn requires_anchor(&self) -> bool {
        matches!(self, GenerationMode::Portrait)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Snapshot => "snapshot",
            GenerationMode::Portrait => "portrait",
            GenerationMode::Atmosphere => "atmosphere",
        }
    }
}

/// State of the current generation request: idle -> pending -> ready | failed.
/// Failed is terminal for that request; a retry starts a new one.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneRequestState {
    Idle,
    Pending {
        trigger: SceneTrigger,
        sparks_deducted: u32,
    },
    Ready,
    Failed {
        reason: String,
    },
}

/// Manages the lifecycle of scene generation for one session, decoupled
/// from the text stream. Holds the scene history; pending and failed
/// requests exist only here, never in the timeline.
#[derive(Debug, Default)]
pub struct SceneCoordinator {
    state: SceneRequestState,
    scenes: Vec<Scene>,
    next_sequence: u32,
}

impl Default for SceneRequestState {
    fn default() -> Self {
        SceneRequestState::Idle
    }
}

impl SceneCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SceneRequestState {
        &self.state
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SceneRequestState::Pending { .. })
    }

    /// Gate for the explicit user "visualize" action.
    ///
    /// Rejects while another request is pending (never queued) and
    /// rejects modes whose inputs are missing, before any request is
    /// issued.
    pub fn begin_user_request(&mut self, mode: GenerationMode, has_anchor: bool) -> Result<()> {
        if self.is_pending() {
            return Err(Error::SceneAlreadyPending);
        }
        if mode.requires_anchor() && !has_anchor {
            return Err(Error::AnchorRequired);
        }
        self.state = SceneRequestState::Pending {
            trigger: SceneTrigger::UserRequest,
            sparks_deducted: mode.spark_cost(),
        };
        Ok(())
    }

    /// Server-initiated visual announced by `visual_pending` on the text
    /// stream. Returns false if a request is already pending.
    pub fn begin_stream_request(&mut self, sparks_deducted: u32) -> bool {
        if self.is_pending() {
            return false;
        }
        self.state = SceneRequestState::Pending {
            trigger: SceneTrigger::DirectorHint,
            sparks_deducted,
        };
        true
    }

    /// Resolve the pending request into a scene, appending it to the
    /// history with the next sequence index.
    pub fn resolve(
        &mut self,
        session_id: &str,
        image_url: String,
        caption: Option<String>,
    ) -> Option<&Scene> {
        let SceneRequestState::Pending { trigger, .. } = &self.state else {
            tracing::warn!("visual resolved with no pending request");
            return None;
        };
        let trigger = *trigger;
        let scene = Scene {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            sequence: self.next_sequence,
            image_url,
            caption,
            trigger,
            memory: false,
            created_at: Utc::now().timestamp_millis(),
        };
        self.next_sequence += 1;
        self.scenes.push(scene);
        self.state = SceneRequestState::Ready;
        self.scenes.last()
    }

    /// Fail the pending request. No scene is recorded. Returns whether a
    /// request was actually pending.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.state = SceneRequestState::Failed {
            reason: reason.into(),
        };
        true
    }

    /// The text stream closed. A stream-initiated visual that never got
    /// its `visual_ready` fails with it; an out-of-band user request is
    /// independent and stays pending.
    pub fn on_stream_closed(&mut self) -> bool {
        match self.state {
            SceneRequestState::Pending {
                trigger: SceneTrigger::DirectorHint,
                ..
            } => self.fail("stream ended before the scene resolved"),
            _ => false,
        }
    }

    /// Toggle the user-curated memory flag on a scene.
    pub fn set_memory(&mut self, scene_id: Uuid, memory: bool) -> bool {
        match self.scenes.iter_mut().find(|s| s.id == scene_id) {
            Some(scene) => {
                scene.memory = memory;
                true
            }
            None => false,
        }
    }

    /// Discard all request state and history for a session reset.
    pub fn reset(&mut self) {
        self.state = SceneRequestState::Idle;
        self.scenes.clear();
        self.next_sequence = 0;
    }
}
