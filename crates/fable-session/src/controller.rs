//! Conversation session orchestration

use std::sync::{Arc, atomic::Ordering};

use futures::StreamExt;
use tokio::sync::broadcast;

use fable_protocol::{
    Error as ProtocolError, StreamEvent,
    decoder::EventStream,
    types::{DirectorStatus, DirectorUpdate, PacingPhase, SceneRequest},
};

use crate::{
    backend::Backend,
    director::{DirectorSnapshot, DirectorTracker},
    error::{Error, Result},
    escalation::{Escalation, ModalState, escalate},
    events::{PresentationHint, SessionEvent},
    handle::SessionHandle,
    scene::{GenerationMode, SceneCoordinator},
    session::{Message, Scene, Session},
    timeline::{self, TimelineItem},
};

/// Owns the state of the active conversation and drives reply streams
/// end to end.
///
/// Single-writer discipline: the decoder, tracker, and coordinator only
/// produce values; every mutation of the message list, scene history,
/// and director snapshot happens here. That is what keeps the timeline
/// merge a pure function of state.
pub struct SessionController {
    session: Option<Session>,
    messages: Vec<Message>,
    director: DirectorTracker,
    scenes: SceneCoordinator,
    /// Single-slot accumulator for the in-flight assistant reply.
    streaming: Option<String>,
    backend: Arc<dyn Backend>,
    event_tx: broadcast::Sender<SessionEvent>,
    handle: SessionHandle,
    modal: ModalState,
    /// Character reference image for anchored generation modes.
    anchor_image: Option<String>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            session: None,
            messages: Vec::new(),
            director: DirectorTracker::new(),
            scenes: SceneCoordinator::new(),
            streaming: None,
            backend,
            event_tx,
            handle: SessionHandle::new(),
            modal: ModalState::new(),
            anchor_image: None,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Get a cloneable handle for aborting from external code.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn scenes(&self) -> &[Scene] {
        self.scenes.scenes()
    }

    /// State of the current scene generation request.
    pub fn scene_state(&self) -> &crate::scene::SceneRequestState {
        self.scenes.state()
    }

    pub fn director(&self) -> &DirectorSnapshot {
        self.director.snapshot()
    }

    /// The currently open blocking modal, if any.
    pub fn open_modal(&self) -> Option<&Escalation> {
        self.modal.open()
    }

    /// User dismissed the blocking modal.
    pub fn dismiss_modal(&mut self) {
        self.modal.close();
    }

    /// Set the character reference image used by anchored generation
    /// modes; `None` disables them.
    pub fn set_anchor_image(&mut self, url: Option<String>) {
        self.anchor_image = url;
    }

    /// Toggle the keep-as-memory flag on a scene. Returns false for an
    /// unknown scene id.
    pub fn set_scene_memory(&mut self, scene_id: uuid::Uuid, memory: bool) -> bool {
        self.scenes.set_memory(scene_id, memory)
    }

    /// The merged, chronologically ordered view of the conversation.
    pub fn timeline(&self) -> Vec<TimelineItem<'_>> {
        timeline::merge(
            &self.messages,
            self.scenes.scenes(),
            self.streaming.as_deref(),
        )
    }

    /// Resolve or create the active session for a character, replacing
    /// any previous session state.
    pub async fn start(
        &mut self,
        character_id: &str,
        episode_template: Option<&str>,
    ) -> Result<&Session> {
        // Any stream still running belongs to the previous session.
        self.handle.abort();

        let info = self
            .backend
            .resolve_session(character_id, episode_template)
            .await
            .map_err(|e| map_start_error(e, character_id))?;

        if let Some(required) = info.required_sparks {
            let check = self.backend.check_credits(required).await?;
            if !check.allowed {
                return Err(Error::EpisodeUnavailable { required });
            }
        }

        self.messages.clear();
        self.scenes.reset();
        self.director.reset();
        self.streaming = None;
        self.modal.close();

        let seed = DirectorUpdate {
            turn_count: info.turn_count,
            turns_remaining: info.turns_remaining,
            is_complete: info.is_complete,
            status: if info.is_complete {
                DirectorStatus::Done
            } else {
                DirectorStatus::Going
            },
            pacing: PacingPhase::Establish,
        };
        self.director.apply_done(Some(&seed));

        let session = Session {
            id: info.session_id,
            character_id: info.character_id,
            episode_id: info.episode_id,
            completed: info.is_complete,
        };
        Ok(&*self.session.insert(session))
    }

    /// Send one user message and consume its reply stream to completion.
    ///
    /// Rejects locally, with no network call, when the text is empty,
    /// a send is already in flight, or the session is terminal. The user
    /// message is committed optimistically and kept even if the stream
    /// later fails; partial assistant output is never persisted.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }
        if self.handle.is_streaming() {
            return Err(Error::SendInFlight);
        }
        let session = self.session.as_ref().ok_or(Error::NoActiveSession)?;
        if session.completed || self.director.is_done() {
            return Err(Error::SessionComplete);
        }
        let session_id = session.id.clone();
        let character_id = session.character_id.clone();

        let user_message = Message::user(&session_id, text);
        self.messages.push(user_message.clone());

        let cancel = self.handle.reset_cancel();
        let epoch = self.handle.epoch();

        let stream = match self.backend.stream_reply(&character_id, text, cancel).await {
            Ok(stream) => stream,
            Err(error) => {
                self.report_failure(&error);
                return Err(error.into());
            }
        };

        self.handle.is_streaming.store(true, Ordering::Release);
        self.streaming = Some(String::new());
        let _ = self.event_tx.send(SessionEvent::StreamStart {
            message: user_message,
        });

        let result = self.consume_stream(stream, &session_id, epoch).await;

        self.handle.is_streaming.store(false, Ordering::Release);
        self.streaming = None;
        let _ = self.event_tx.send(SessionEvent::StreamEnd);
        result
    }

    /// Abort the in-flight stream. Accumulated assistant text is
    /// discarded, never finalized as a partial message. Idempotent.
    pub fn cancel(&mut self) {
        self.handle.abort();
        self.streaming = None;
    }

    /// Explicit user-initiated termination, independent of
    /// director-detected completion. Idempotent; no network call.
    pub fn end_session(&mut self) {
        self.cancel();
        if let Some(session) = self.session.as_mut() {
            session.completed = true;
        }
    }

    /// Explicit user "visualize" action: out-of-band scene generation.
    ///
    /// Gated before any network call: one pending request per session,
    /// and anchored modes need a reference image. The credit balance is
    /// re-read on every attempt because it mutates server-side.
    pub async fn request_scene(&mut self, mode: GenerationMode) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NoActiveSession)?;
        let session_id = session.id.clone();
        let episode_id = session.episode_id.clone();

        self.scenes
            .begin_user_request(mode, self.anchor_image.is_some())?;
        let _ = self.event_tx.send(SessionEvent::ScenePending);

        let cost = mode.spark_cost();
        match self.backend.check_credits(cost).await {
            Ok(check) if !check.allowed => {
                let error = ProtocolError::InsufficientSparks {
                    message: format!("{} sparks required", cost),
                    required: Some(cost),
                };
                self.fail_scene_request(error.to_string());
                self.report_failure(&error);
                return Err(error.into());
            }
            Ok(_) => {}
            Err(error) => {
                self.fail_scene_request(error.to_string());
                self.report_failure(&error);
                return Err(error.into());
            }
        }

        let request = SceneRequest {
            episode_id,
            prompt: None,
            trigger_type: Some("user_request".into()),
            generation_mode: Some(mode.as_str().into()),
        };
        match self.backend.generate_scene(&request).await {
            Ok(generated) => {
                if self.session.as_ref().map(|s| s.id.as_str()) != Some(session_id.as_str()) {
                    // The session changed while the request was out.
                    tracing::debug!("dropping scene result for a stale session");
                    return Ok(());
                }
                if let Some(scene) =
                    self.scenes
                        .resolve(&session_id, generated.image_url, generated.caption)
                {
                    let scene = scene.clone();
                    let image_url = scene.image_url.clone();
                    let _ = self.event_tx.send(SessionEvent::SceneReady { scene });
                    let _ = self.event_tx.send(SessionEvent::PresentationHint {
                        hint: PresentationHint::SceneBackdrop { image_url },
                    });
                }
                Ok(())
            }
            Err(error) => {
                self.fail_scene_request(error.to_string());
                self.report_failure(&error);
                Err(error.into())
            }
        }
    }

    /// Destructive: erase the session/message/scene history for a
    /// character pair. Confirmation is gated upstream of this call.
    pub async fn reset_relationship(&mut self, character_id: &str) -> Result<()> {
        self.backend.erase_history(character_id).await?;
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.character_id == character_id)
        {
            self.handle.abort();
            self.session = None;
            self.messages.clear();
            self.scenes.reset();
            self.director.reset();
            self.streaming = None;
            self.modal.close();
        }
        Ok(())
    }

    /// Drive one reply stream, applying events in arrival order.
    ///
    /// Every application is guarded by the epoch captured at stream
    /// start: a frame arriving after a cancel or session switch is
    /// discarded here, never an observable error.
    async fn consume_stream(
        &mut self,
        mut stream: EventStream,
        session_id: &str,
        epoch: u64,
    ) -> Result<()> {
        let mut failure: Option<ProtocolError> = None;

        while let Some(item) = stream.next().await {
            let session_matches = self
                .session
                .as_ref()
                .is_some_and(|s| s.id.as_str() == session_id);
            if self.handle.epoch() != epoch || !session_matches {
                tracing::debug!("dropping frame from a stale stream");
                break;
            }
            match item {
                Ok(event) => self.apply_event(event, session_id),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        // A hint-triggered visual that never resolved fails with its
        // stream; an out-of-band user request is unaffected.
        if self.scenes.on_stream_closed() {
            let _ = self.event_tx.send(SessionEvent::SceneFailed {
                reason: "stream ended before the scene resolved".into(),
            });
        }

        if let Some(error) = failure {
            self.streaming = None;
            if matches!(error, ProtocolError::Aborted) {
                // Cancellation is a user action, not a failure.
                return Ok(());
            }
            self.report_failure(&error);
            return Err(error.into());
        }
        Ok(())
    }

    fn apply_event(&mut self, event: StreamEvent, session_id: &str) {
        match event {
            StreamEvent::Chunk { content } => {
                if let Some(buffer) = self.streaming.as_mut() {
                    buffer.push_str(&content);
                }
                let _ = self.event_tx.send(SessionEvent::Chunk { delta: content });
            }
            StreamEvent::Done {
                content,
                suggest_scene,
                director,
                ..
            } => {
                // The done content is authoritative; the chunk
                // accumulation is display-only and dropped here.
                self.streaming = None;
                let message = Message::assistant(session_id, content);
                self.messages.push(message.clone());
                let _ = self
                    .event_tx
                    .send(SessionEvent::AssistantMessage { message });

                if self.director.apply_done(director.as_ref()) {
                    let _ = self.event_tx.send(SessionEvent::DirectorUpdate {
                        snapshot: self.director.snapshot().clone(),
                    });
                }
                if suggest_scene {
                    let _ = self.event_tx.send(SessionEvent::SceneSuggested);
                }
            }
            StreamEvent::VisualPending {
                sparks_deducted, ..
            } => {
                if self.scenes.begin_stream_request(sparks_deducted) {
                    let _ = self.event_tx.send(SessionEvent::ScenePending);
                } else {
                    tracing::warn!("visual_pending while a scene request is already pending");
                }
            }
            StreamEvent::VisualReady { image_url, caption } => {
                if let Some(scene) = self.scenes.resolve(session_id, image_url, caption) {
                    let scene = scene.clone();
                    let image_url = scene.image_url.clone();
                    let _ = self.event_tx.send(SessionEvent::SceneReady { scene });
                    let _ = self.event_tx.send(SessionEvent::PresentationHint {
                        hint: PresentationHint::SceneBackdrop { image_url },
                    });
                }
            }
            StreamEvent::InstructionCard { content } => {
                let message = Message::instruction(session_id, content);
                self.messages.push(message.clone());
                let _ = self
                    .event_tx
                    .send(SessionEvent::InstructionCard { message });
            }
            StreamEvent::NeedsSparks { message } => {
                // Surfaces to the escalation policy only; message and
                // scene history stay untouched.
                self.fail_scene_request(message.clone());
                self.dispatch(Escalation::InsufficientSparks { required: None });
            }
            StreamEvent::EpisodeComplete {
                turn_count,
                trigger,
                next_suggestion,
                evaluation,
            } => {
                self.director
                    .apply_complete(turn_count, trigger, next_suggestion, evaluation);
                if let Some(session) = self.session.as_mut() {
                    session.completed = true;
                }
                let _ = self.event_tx.send(SessionEvent::EpisodeComplete {
                    snapshot: self.director.snapshot().clone(),
                });
            }
        }
    }

    fn fail_scene_request(&mut self, reason: String) {
        if self.scenes.fail(reason.clone()) {
            let _ = self.event_tx.send(SessionEvent::SceneFailed { reason });
        }
    }

    /// Route a failure through the escalation policy.
    fn report_failure(&mut self, error: &ProtocolError) {
        self.dispatch(escalate(error));
    }

    fn dispatch(&mut self, escalation: Escalation) {
        if let Escalation::Generic { message } = &escalation {
            tracing::error!(error = %message, "conversation request failed");
            let _ = self.event_tx.send(SessionEvent::Error {
                message: message.clone(),
            });
        } else {
            self.modal.dispatch(&escalation);
        }
        let _ = self.event_tx.send(SessionEvent::Escalate { escalation });
    }
}

fn map_start_error(error: ProtocolError, character_id: &str) -> Error {
    match &error {
        ProtocolError::Api { tag, .. } if tag.contains("not_found") || tag == "http_404" => {
            Error::NotFound(character_id.to_string())
        }
        _ => Error::Protocol(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneRequestState;
    use crate::session::{MessageKind, Role, SceneTrigger};
    use async_trait::async_trait;
    use fable_protocol::types::{
        CompletionTrigger, CreditCheck, GeneratedScene, NextEpisode, SessionInfo, VisualKind,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU32;
    use tokio_util::sync::CancellationToken;

    enum Script {
        Items(Vec<fable_protocol::Result<StreamEvent>>),
        /// Aborts the handle between `before` and `after`, simulating a
        /// cancel/navigation racing the stream.
        AbortMidway {
            before: Vec<StreamEvent>,
            handle: SessionHandle,
            after: Vec<StreamEvent>,
        },
    }

    struct MockBackend {
        scripts: Mutex<Vec<Script>>,
        stream_calls: AtomicU32,
        generate_calls: AtomicU32,
        erase_calls: AtomicU32,
        credits_allowed: Mutex<bool>,
        generate_result: Mutex<Option<fable_protocol::Result<GeneratedScene>>>,
        premium_cost: Option<u32>,
        known_character: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(Vec::new()),
                stream_calls: AtomicU32::new(0),
                generate_calls: AtomicU32::new(0),
                erase_calls: AtomicU32::new(0),
                credits_allowed: Mutex::new(true),
                generate_result: Mutex::new(None),
                premium_cost: None,
                known_character: true,
            }
        }

        fn push_script(&self, items: Vec<fable_protocol::Result<StreamEvent>>) {
            self.scripts.lock().push(Script::Items(items));
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn stream_reply(
            &self,
            _character_id: &str,
            _content: &str,
            _cancel: CancellationToken,
        ) -> fable_protocol::Result<EventStream> {
            self.stream_calls.fetch_add(1, Ordering::Relaxed);
            let script = {
                let mut scripts = self.scripts.lock();
                if scripts.is_empty() {
                    Script::Items(vec![])
                } else {
                    scripts.remove(0)
                }
            };
            let stream: EventStream = match script {
                Script::Items(items) => Box::pin(futures::stream::iter(items)),
                Script::AbortMidway {
                    before,
                    handle,
                    after,
                } => Box::pin(async_stream::stream! {
                    for event in before {
                        yield Ok(event);
                    }
                    handle.abort();
                    for event in after {
                        yield Ok(event);
                    }
                }),
            };
            Ok(stream)
        }

        async fn generate_scene(
            &self,
            _request: &SceneRequest,
        ) -> fable_protocol::Result<GeneratedScene> {
            self.generate_calls.fetch_add(1, Ordering::Relaxed);
            self.generate_result.lock().take().unwrap_or_else(|| {
                Ok(GeneratedScene {
                    image_id: "img-1".into(),
                    image_url: "https://img/1.png".into(),
                    caption: Some("a quiet rooftop".into()),
                })
            })
        }

        async fn resolve_session(
            &self,
            character_id: &str,
            _episode_template: Option<&str>,
        ) -> fable_protocol::Result<SessionInfo> {
            if !self.known_character {
                return Err(ProtocolError::api("character_not_found", "no such character"));
            }
            Ok(SessionInfo {
                session_id: "sess-1".into(),
                character_id: character_id.into(),
                episode_id: "ep-1".into(),
                turn_count: 0,
                turns_remaining: None,
                is_complete: false,
                required_sparks: self.premium_cost,
            })
        }

        async fn check_credits(&self, cost: u32) -> fable_protocol::Result<CreditCheck> {
            let allowed = *self.credits_allowed.lock();
            Ok(CreditCheck {
                balance: if allowed { 100 } else { 0 },
                cost,
                allowed,
            })
        }

        async fn erase_history(&self, _character_id: &str) -> fable_protocol::Result<()> {
            self.erase_calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn chunk(text: &str) -> StreamEvent {
        StreamEvent::Chunk {
            content: text.into(),
        }
    }

    fn done(content: &str, director: Option<DirectorUpdate>) -> StreamEvent {
        StreamEvent::Done {
            content: content.into(),
            suggest_scene: false,
            episode_id: "ep-1".into(),
            director,
        }
    }

    fn director(turn_count: u32, turns_remaining: Option<u32>) -> DirectorUpdate {
        DirectorUpdate {
            turn_count,
            turns_remaining,
            is_complete: false,
            status: DirectorStatus::Going,
            pacing: PacingPhase::Establish,
        }
    }

    fn visual_pending(sparks_deducted: u32) -> StreamEvent {
        StreamEvent::VisualPending {
            visual_type: VisualKind::Atmosphere,
            visual_hint: None,
            sparks_deducted,
        }
    }

    async fn started(backend: Arc<MockBackend>) -> SessionController {
        let mut controller = SessionController::new(backend);
        controller.start("char-1", None).await.unwrap();
        controller
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // ===== start =====

    #[tokio::test]
    async fn test_start_resolves_session() {
        let backend = Arc::new(MockBackend::new());
        let controller = started(backend).await;
        let session = controller.session().unwrap();
        assert_eq!(session.id, "sess-1");
        assert_eq!(session.character_id, "char-1");
        assert!(!session.completed);
    }

    #[tokio::test]
    async fn test_start_unknown_character() {
        let backend = Arc::new(MockBackend {
            known_character: false,
            ..MockBackend::new()
        });
        let mut controller = SessionController::new(backend);
        let err = controller.start("ghost", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_start_premium_episode_without_credits() {
        let backend = Arc::new(MockBackend {
            premium_cost: Some(20),
            credits_allowed: Mutex::new(false),
            ..MockBackend::new()
        });
        let mut controller = SessionController::new(backend);
        let err = controller.start("char-1", Some("premium")).await.unwrap_err();
        assert!(matches!(err, Error::EpisodeUnavailable { required: 20 }));
        assert!(controller.session().is_none());
    }

    // ===== send: local rejections =====

    #[tokio::test]
    async fn test_send_rejects_empty_text_without_network() {
        let backend = Arc::new(MockBackend::new());
        let mut controller = started(backend.clone()).await;
        assert!(matches!(controller.send("").await, Err(Error::EmptyMessage)));
        assert!(matches!(
            controller.send("   \n").await,
            Err(Error::EmptyMessage)
        ));
        assert_eq!(backend.stream_calls.load(Ordering::Relaxed), 0);
        assert!(controller.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_rejects_without_session() {
        let backend = Arc::new(MockBackend::new());
        let mut controller = SessionController::new(backend);
        assert!(matches!(
            controller.send("hi").await,
            Err(Error::NoActiveSession)
        ));
    }

    // ===== send: streaming =====

    #[tokio::test]
    async fn test_scenario_hi_with_director() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![
            Ok(chunk("H")),
            Ok(chunk("i there")),
            Ok(done("Hi there", Some(director(1, Some(3))))),
        ]);
        let mut controller = started(backend).await;
        controller.send("hi").await.unwrap();

        let messages = controller.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hi there");

        let snapshot = controller.director();
        assert_eq!(snapshot.turn_count, 1);
        assert_eq!(snapshot.turns_remaining, Some(3));
        assert_eq!(snapshot.status, DirectorStatus::Going);
        assert_eq!(snapshot.pacing, PacingPhase::Establish);
    }

    #[tokio::test]
    async fn test_finalized_content_is_done_content_not_chunk_concat() {
        // The server recomputes the full text; chunks may differ.
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![
            Ok(chunk("Hel")),
            Ok(chunk("lo")),
            Ok(done("Hello!", None)),
        ]);
        let mut controller = started(backend).await;
        controller.send("hey").await.unwrap();
        assert_eq!(controller.messages()[1].content, "Hello!");
    }

    #[tokio::test]
    async fn test_abort_mid_stream_discards_partial_output() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![Ok(chunk("Hel")), Err(ProtocolError::Aborted)]);
        let mut controller = started(backend).await;

        controller.send("hi").await.unwrap();

        // The optimistic user message stays; no assistant message was
        // finalized from the partial output.
        let messages = controller.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(controller.timeline().len() == 1);
    }

    #[tokio::test]
    async fn test_stale_stream_frames_dropped_after_abort() {
        let backend = Arc::new(MockBackend::new());
        let mut controller = started(backend.clone()).await;
        backend.scripts.lock().push(Script::AbortMidway {
            before: vec![chunk("par")],
            handle: controller.handle(),
            after: vec![chunk("tial"), done("partial reply", Some(director(1, None)))],
        });

        controller.send("hi").await.unwrap();

        // Frames after the abort must not mutate state: no assistant
        // message, no director advance.
        assert_eq!(controller.messages().len(), 1);
        assert_eq!(controller.director().turn_count, 0);
    }

    #[tokio::test]
    async fn test_stream_error_keeps_user_message_and_escalates_generic() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![
            Ok(chunk("He")),
            Err(ProtocolError::Stream("model unavailable".into())),
        ]);
        let mut controller = started(backend).await;
        let mut rx = controller.subscribe();

        let err = controller.send("hi").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Stream(_))));

        assert_eq!(controller.messages().len(), 1);
        assert_eq!(controller.messages()[0].role, Role::User);
        assert!(controller.open_modal().is_none());

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Escalate {
                escalation: Escalation::Generic { .. }
            }
        )));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_instruction_card_stored_inline() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![
            Ok(StreamEvent::InstructionCard {
                content: "She slides the letter across the table.".into(),
            }),
            Ok(done("What do you do?", None)),
        ]);
        let mut controller = started(backend).await;
        controller.send("open it").await.unwrap();

        let messages = controller.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].kind, MessageKind::Instruction);
        assert_eq!(messages[2].kind, MessageKind::Dialogue);
    }

    #[tokio::test]
    async fn test_suggest_scene_emits_event() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![Ok(StreamEvent::Done {
            content: "The skyline glows.".into(),
            suggest_scene: true,
            episode_id: "ep-1".into(),
            director: None,
        })]);
        let mut controller = started(backend).await;
        let mut rx = controller.subscribe();
        controller.send("look outside").await.unwrap();

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::SceneSuggested)));
    }

    // ===== scenes over the stream =====

    #[tokio::test]
    async fn test_inline_visual_resolves_to_scene() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![
            Ok(visual_pending(5)),
            Ok(StreamEvent::VisualReady {
                image_url: "https://img/rooftop.png".into(),
                caption: Some("the rooftop at dusk".into()),
            }),
            Ok(done("See for yourself.", None)),
        ]);
        let mut controller = started(backend).await;
        let mut rx = controller.subscribe();
        controller.send("show me").await.unwrap();

        let scenes = controller.scenes();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].trigger, SceneTrigger::DirectorHint);
        assert_eq!(scenes[0].sequence, 0);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::PresentationHint {
                hint: PresentationHint::SceneBackdrop { .. }
            }
        )));
    }

    #[tokio::test]
    async fn test_visual_pending_fails_when_stream_drops() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![
            Ok(visual_pending(5)),
            Err(ProtocolError::Sse("connection reset".into())),
        ]);
        let mut controller = started(backend).await;

        let result = controller.send("show me").await;
        assert!(result.is_err());

        // Pending -> failed; no scene joined the history.
        assert!(controller.scenes().is_empty());
        assert!(matches!(
            controller.scene_state(),
            SceneRequestState::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_needs_sparks_mutates_nothing_and_opens_modal() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![Ok(StreamEvent::NeedsSparks {
            message: "You are out of sparks".into(),
        })]);
        let mut controller = started(backend).await;
        controller.send("visualize this").await.unwrap();

        // Only the optimistic user message; scene history untouched.
        assert_eq!(controller.messages().len(), 1);
        assert!(controller.scenes().is_empty());
        assert_eq!(
            controller.open_modal(),
            Some(&Escalation::InsufficientSparks { required: None })
        );
    }

    // ===== completion =====

    #[tokio::test]
    async fn test_episode_complete_is_terminal() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![
            Ok(done("And so it ends.", Some(director(8, Some(0))))),
            Ok(StreamEvent::EpisodeComplete {
                turn_count: 8,
                trigger: CompletionTrigger::TurnLimit,
                next_suggestion: Some(NextEpisode {
                    episode_id: "ep-2".into(),
                    title: "The Sequel".into(),
                    slug: "the-sequel".into(),
                    episode_number: 2,
                    situation: "Later that night".into(),
                    character_id: "char-1".into(),
                }),
                evaluation: None,
            }),
        ]);
        let mut controller = started(backend.clone()).await;
        controller.send("goodbye").await.unwrap();

        assert!(controller.session().unwrap().completed);
        let snapshot = controller.director();
        assert_eq!(snapshot.status, DirectorStatus::Done);
        assert_eq!(snapshot.last_trigger, Some(CompletionTrigger::TurnLimit));
        assert_eq!(
            snapshot.next_episode.as_ref().map(|n| n.episode_id.as_str()),
            Some("ep-2")
        );

        // Further sends are rejected without a network call.
        let err = controller.send("wait").await.unwrap_err();
        assert!(matches!(err, Error::SessionComplete));
        assert_eq!(backend.stream_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_end_session_is_idempotent() {
        let backend = Arc::new(MockBackend::new());
        let mut controller = started(backend.clone()).await;
        controller.end_session();
        controller.end_session();
        assert!(controller.session().unwrap().completed);
        let err = controller.send("hello?").await.unwrap_err();
        assert!(matches!(err, Error::SessionComplete));
        assert_eq!(backend.stream_calls.load(Ordering::Relaxed), 0);
    }

    // ===== out-of-band scene generation =====

    #[tokio::test]
    async fn test_request_scene_appends_user_triggered_scene() {
        let backend = Arc::new(MockBackend::new());
        let mut controller = started(backend.clone()).await;
        controller.request_scene(GenerationMode::Snapshot).await.unwrap();

        let scenes = controller.scenes();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].trigger, SceneTrigger::UserRequest);
        assert_eq!(scenes[0].caption.as_deref(), Some("a quiet rooftop"));
        assert_eq!(backend.generate_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_request_scene_anchored_mode_needs_anchor() {
        let backend = Arc::new(MockBackend::new());
        let mut controller = started(backend.clone()).await;

        let err = controller.request_scene(GenerationMode::Portrait).await.unwrap_err();
        assert!(matches!(err, Error::AnchorRequired));
        assert_eq!(backend.generate_calls.load(Ordering::Relaxed), 0);

        controller.set_anchor_image(Some("https://img/anchor.png".into()));
        controller.request_scene(GenerationMode::Portrait).await.unwrap();
        assert_eq!(controller.scenes().len(), 1);
    }

    #[tokio::test]
    async fn test_request_scene_without_credits_opens_modal() {
        let backend = Arc::new(MockBackend::new());
        *backend.credits_allowed.lock() = false;
        let mut controller = started(backend.clone()).await;

        let err = controller.request_scene(GenerationMode::Snapshot).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InsufficientSparks { .. })
        ));
        assert_eq!(
            controller.open_modal(),
            Some(&Escalation::InsufficientSparks { required: Some(5) })
        );
        assert!(controller.scenes().is_empty());
        assert_eq!(backend.generate_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_request_scene_http_failure_fails_request() {
        let backend = Arc::new(MockBackend::new());
        *backend.generate_result.lock() =
            Some(Err(ProtocolError::api("server_error", "render farm down")));
        let mut controller = started(backend).await;

        let result = controller.request_scene(GenerationMode::Snapshot).await;
        assert!(result.is_err());
        assert!(controller.scenes().is_empty());
        assert!(matches!(
            controller.scene_state(),
            SceneRequestState::Failed { .. }
        ));
    }

    // ===== reset =====

    #[tokio::test]
    async fn test_reset_relationship_erases_state() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![Ok(done("Hello.", Some(director(1, None))))]);
        let mut controller = started(backend.clone()).await;
        controller.send("hi").await.unwrap();
        assert_eq!(controller.messages().len(), 2);

        controller.reset_relationship("char-1").await.unwrap();
        assert_eq!(backend.erase_calls.load(Ordering::Relaxed), 1);
        assert!(controller.session().is_none());
        assert!(controller.messages().is_empty());
        assert!(controller.scenes().is_empty());
        assert_eq!(controller.director().turn_count, 0);
    }

    #[tokio::test]
    async fn test_reset_other_character_keeps_state() {
        let backend = Arc::new(MockBackend::new());
        let mut controller = started(backend).await;
        controller.reset_relationship("char-2").await.unwrap();
        assert!(controller.session().is_some());
    }

    // ===== timeline =====

    #[tokio::test]
    async fn test_timeline_interleaves_messages_and_scenes() {
        let backend = Arc::new(MockBackend::new());
        backend.push_script(vec![
            Ok(visual_pending(5)),
            Ok(StreamEvent::VisualReady {
                image_url: "https://img/1.png".into(),
                caption: None,
            }),
            Ok(done("Look at this.", None)),
        ]);
        let mut controller = started(backend).await;
        controller.send("show me").await.unwrap();

        let timeline = controller.timeline();
        assert_eq!(timeline.len(), 3);
        // Not streaming, so no pseudo-item.
        assert!(!timeline
            .iter()
            .any(|item| matches!(item, TimelineItem::Streaming(_))));
    }
}
