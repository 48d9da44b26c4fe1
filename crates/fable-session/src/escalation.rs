//! Routing of failures to blocking surfaces

use fable_protocol::Error as ProtocolError;
use serde::{Deserialize, Serialize};

/// Where a failure surfaces. Exactly one per failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Escalation {
    /// Blocking rate-limit modal, with cooldown seconds when known.
    RateLimit { retry_after: Option<u64> },
    /// Blocking "buy sparks" modal, carrying the required cost when known.
    InsufficientSparks { required: Option<u32> },
    /// Blocking resource-quota modal, orthogonal to spark balance.
    QuotaExceeded,
    /// Non-blocking generic error path: logged, surfaced via callback.
    Generic { message: String },
}

impl Escalation {
    /// Whether this escalation occupies the single blocking modal slot.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Escalation::Generic { .. })
    }
}

/// Classify a failure into its surface. Total: every error maps to
/// exactly one escalation, checked in priority order. Dispatch never
/// mutates session, message, or scene state.
pub fn escalate(error: &ProtocolError) -> Escalation {
    if error.is_rate_limited() {
        return Escalation::RateLimit {
            retry_after: error.retry_after(),
        };
    }
    if error.is_insufficient_sparks() {
        return Escalation::InsufficientSparks {
            required: error.required_sparks(),
        };
    }
    if error.is_quota_exceeded() {
        return Escalation::QuotaExceeded;
    }
    Escalation::Generic {
        message: error.to_string(),
    }
}

/// The single blocking modal slot. A later blocking dispatch replaces
/// whatever is open; generic escalations never occupy it.
#[derive(Debug, Default)]
pub struct ModalState {
    open: Option<Escalation>,
}

impl ModalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route an escalation. Returns whether it took the modal slot.
    pub fn dispatch(&mut self, escalation: &Escalation) -> bool {
        if escalation.is_blocking() {
            self.open = Some(escalation.clone());
            true
        } else {
            false
        }
    }

    pub fn open(&self) -> Option<&Escalation> {
        self.open.as_ref()
    }

    /// User dismissed the modal.
    pub fn close(&mut self) {
        self.open = None;
    }
}
