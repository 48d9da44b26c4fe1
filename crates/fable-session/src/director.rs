//! Narrative director state tracking

use fable_protocol::types::{
    CompletionTrigger, DirectorStatus, DirectorUpdate, Evaluation, NextEpisode, PacingPhase,
};
use serde::{Deserialize, Serialize};

/// The latest server-authored narrative progress for a session.
///
/// Replaced wholesale on each update that carries director data; never
/// merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorSnapshot {
    pub turn_count: u32,
    /// `None` means the episode is unbounded.
    pub turns_remaining: Option<u32>,
    pub pacing: PacingPhase,
    pub status: DirectorStatus,
    /// Set once the episode completes.
    pub last_trigger: Option<CompletionTrigger>,
    pub next_episode: Option<NextEpisode>,
    pub evaluation: Option<Evaluation>,
}

impl Default for DirectorSnapshot {
    fn default() -> Self {
        Self {
            turn_count: 0,
            turns_remaining: None,
            pacing: PacingPhase::Establish,
            status: DirectorStatus::Going,
            last_trigger: None,
            next_episode: None,
            evaluation: None,
        }
    }
}

/// Pure reducer over [`DirectorSnapshot`] for `done` and
/// `episode_complete` events. No other event kind touches it.
#[derive(Debug, Clone, Default)]
pub struct DirectorTracker {
    snapshot: DirectorSnapshot,
}

impl DirectorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &DirectorSnapshot {
        &self.snapshot
    }

    /// Whether the episode reached its terminal state.
    pub fn is_done(&self) -> bool {
        self.snapshot.status == DirectorStatus::Done
    }

    /// Apply the director payload of a `done` event.
    ///
    /// A missing payload leaves the snapshot unchanged. Updates are
    /// ignored once the episode is complete, and a backward turn count
    /// is dropped: turn_count only advances within a session.
    /// Returns whether the snapshot changed.
    pub fn apply_done(&mut self, update: Option<&DirectorUpdate>) -> bool {
        if self.is_done() {
            return false;
        }
        let Some(update) = update else {
            return false;
        };
        if update.turn_count < self.snapshot.turn_count {
            tracing::warn!(
                current = self.snapshot.turn_count,
                incoming = update.turn_count,
                "dropping backward director update"
            );
            return false;
        }
        self.snapshot.turn_count = update.turn_count;
        self.snapshot.turns_remaining = update.turns_remaining;
        self.snapshot.pacing = update.pacing;
        self.snapshot.status = if update.is_complete {
            DirectorStatus::Done
        } else {
            update.status
        };
        true
    }

    /// Apply an `episode_complete` event. Terminal: later `done` events
    /// for the same session no longer alter the snapshot.
    pub fn apply_complete(
        &mut self,
        turn_count: u32,
        trigger: CompletionTrigger,
        next_episode: Option<NextEpisode>,
        evaluation: Option<Evaluation>,
    ) {
        self.snapshot.turn_count = self.snapshot.turn_count.max(turn_count);
        self.snapshot.turns_remaining = Some(0);
        self.snapshot.status = DirectorStatus::Done;
        self.snapshot.last_trigger = Some(trigger);
        self.snapshot.next_episode = next_episode;
        self.snapshot.evaluation = evaluation;
    }

    /// Discard all progress. Used on session reset, which creates a
    /// logically new session identity.
    pub fn reset(&mut self) {
        self.snapshot = DirectorSnapshot::default();
    }
}
