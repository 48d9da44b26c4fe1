//! fable-session: Conversation session orchestration
//!
//! This crate owns the client-side state of one scripted conversation:
//! the session controller that drives a reply stream end to end, the
//! director state tracker, the scene generation coordinator, the
//! timeline merger, and the failure escalation policy.

pub mod backend;
pub mod controller;
pub mod director;
pub mod error;
pub mod escalation;
pub mod events;
pub mod handle;
pub mod scene;
pub mod session;
pub mod timeline;

pub use backend::Backend;
pub use controller::SessionController;
pub use director::{DirectorSnapshot, DirectorTracker};
pub use error::{Error, Result};
pub use escalation::{Escalation, ModalState, escalate};
pub use events::{PresentationHint, SessionEvent};
pub use handle::SessionHandle;
pub use scene::{GenerationMode, SceneCoordinator, SceneRequestState};
pub use session::{Message, MessageKind, Role, Scene, SceneTrigger, Session};
pub use timeline::{TimelineItem, merge};
