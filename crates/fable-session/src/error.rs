//! Error types for fable-session

use thiserror::Error;

/// Result type alias using fable-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during session operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the protocol layer
    #[error(transparent)]
    Protocol(#[from] fable_protocol::Error),

    /// The character does not exist
    #[error("Character not found: {0}")]
    NotFound(String),

    /// The episode template requires sparks the user lacks
    #[error("Episode unavailable: requires {required} sparks")]
    EpisodeUnavailable { required: u32 },

    /// No session has been started
    #[error("No active session")]
    NoActiveSession,

    /// Rejected before any network call: empty/whitespace text
    #[error("Message is empty")]
    EmptyMessage,

    /// Rejected before any network call: a send is already streaming
    #[error("A send is already in flight")]
    SendInFlight,

    /// Rejected before any network call: the session is terminal
    #[error("Session is complete")]
    SessionComplete,

    /// A scene request is already pending for this session
    #[error("A scene request is already pending")]
    SceneAlreadyPending,

    /// The generation mode needs a character anchor image
    #[error("Generation mode requires a character anchor image")]
    AnchorRequired,
}

impl Error {
    /// Whether this error was rejected locally, before any network call.
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Error::EmptyMessage
                | Error::SendInFlight
                | Error::SessionComplete
                | Error::SceneAlreadyPending
                | Error::AnchorRequired
                | Error::NoActiveSession
        )
    }
}
