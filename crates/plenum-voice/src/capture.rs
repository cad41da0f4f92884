//! Voice capture state machine.
//!
//! Drives one attempt to capture a spoken question: open the microphone,
//! run speech recognition, and submit the final transcript as a question.
//! Partial transcripts exist only for display and are never submitted.
//!
//! Every start bumps a generation counter and every recognizer event carries
//! the generation it belongs to. Events from a superseded capture (stopped,
//! restarted, or failed since) are discarded on arrival, so a recognizer that
//! delivers late can never submit into a newer attempt.

use crate::error::VoiceError;
use async_trait::async_trait;
use plenum_db::DbPool;
use plenum_realtime::RealtimeHub;
use plenum_store::{create_question, find_profile_by_user, CreateQuestionParams, StoreError};
use plenum_types::{ChangeNotification, ChangeOp, StoreTable};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Microphone access. Opening requests platform permission.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn open(&self) -> Result<(), VoiceError>;
    async fn close(&self);
}

/// What a recognizer reports while listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Interim transcript, display only.
    Partial(String),
    /// Completed transcript for one utterance.
    Final(String),
    /// The recognizer stopped without a final transcript.
    Ended,
    Error(String),
}

/// Streaming speech recognition over an open microphone.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Begins recognition and returns the event stream for this run.
    async fn start(&self, language: &str) -> Result<mpsc::Receiver<RecognizerEvent>, VoiceError>;
    async fn stop(&self);
}

/// Where a capture attempt currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    RequestingPermission,
    Listening { partial: String },
    Submitting { transcript: String },
    /// The attempt failed and stays failed until the user starts again.
    Failed(String),
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new capture began under this generation.
    Started(u64),
    /// A capture is already running; the request did nothing.
    AlreadyActive,
}

struct CaptureState {
    phase: CapturePhase,
    generation: u64,
}

enum EventAction {
    None,
    WindDown,
    Submit(String),
}

/// One participant's capture pipeline for one event.
pub struct VoiceCapture {
    microphone: Arc<dyn Microphone>,
    recognizer: Arc<dyn SpeechRecognizer>,
    pool: DbPool,
    hub: Arc<RealtimeHub>,
    event_id: String,
    user_id: String,
    language: Option<String>,
    state: Mutex<CaptureState>,
}

impl VoiceCapture {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        microphone: Arc<dyn Microphone>,
        recognizer: Arc<dyn SpeechRecognizer>,
        pool: DbPool,
        hub: Arc<RealtimeHub>,
        event_id: impl Into<String>,
        user_id: impl Into<String>,
        language: Option<String>,
    ) -> Self {
        Self {
            microphone,
            recognizer,
            pool,
            hub,
            event_id: event_id.into(),
            user_id: user_id.into(),
            language,
            state: Mutex::new(CaptureState {
                phase: CapturePhase::Idle,
                generation: 0,
            }),
        }
    }

    /// The current phase, cloned for the caller to render.
    pub fn phase(&self) -> CapturePhase {
        self.lock_state().phase.clone()
    }

    /// Begins a capture attempt.
    ///
    /// A second start while one is running is a no-op. Permission refusal and
    /// recognizer startup failure both land in [`CapturePhase::Failed`]; the
    /// machine never retries on its own.
    pub async fn start(self: &Arc<Self>) -> Result<StartOutcome, VoiceError> {
        let generation = {
            let mut state = self.lock_state();
            match state.phase {
                CapturePhase::Idle | CapturePhase::Failed(_) => {}
                _ => return Ok(StartOutcome::AlreadyActive),
            }
            state.generation += 1;
            state.phase = CapturePhase::RequestingPermission;
            state.generation
        };

        if let Err(e) = self.microphone.open().await {
            self.fail(generation, e.to_string());
            return Err(e);
        }

        let language = self.language.as_deref().unwrap_or("en-US");
        let mut rx = match self.recognizer.start(language).await {
            Ok(rx) => rx,
            Err(e) => {
                self.microphone.close().await;
                self.fail(generation, e.to_string());
                return Err(e);
            }
        };

        {
            let mut state = self.lock_state();
            if state.generation == generation {
                state.phase = CapturePhase::Listening {
                    partial: String::new(),
                };
            }
            // A stop during startup already bumped the generation; the pump
            // below drains events that the guard then discards.
        }

        let capture = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                capture.handle_event(generation, event).await;
            }
        });

        Ok(StartOutcome::Started(generation))
    }

    /// Stops the current attempt and invalidates everything in flight.
    pub async fn stop(&self) {
        {
            let mut state = self.lock_state();
            state.generation += 1;
            state.phase = CapturePhase::Idle;
        }
        self.recognizer.stop().await;
        self.microphone.close().await;
    }

    /// Applies one recognizer event delivered under `generation`.
    pub async fn handle_event(&self, generation: u64, event: RecognizerEvent) {
        let action = {
            let mut state = self.lock_state();
            if state.generation != generation {
                debug!(generation, "discarding recognizer event from superseded capture");
                return;
            }
            match event {
                RecognizerEvent::Partial(text) => {
                    if let CapturePhase::Listening { partial } = &mut state.phase {
                        *partial = text;
                    }
                    EventAction::None
                }
                RecognizerEvent::Final(text) => {
                    if !matches!(state.phase, CapturePhase::Listening { .. }) {
                        EventAction::None
                    } else {
                        let transcript = text.trim().to_string();
                        if transcript.is_empty() {
                            state.phase = CapturePhase::Idle;
                            EventAction::WindDown
                        } else {
                            state.phase = CapturePhase::Submitting {
                                transcript: transcript.clone(),
                            };
                            EventAction::Submit(transcript)
                        }
                    }
                }
                RecognizerEvent::Ended => {
                    if matches!(state.phase, CapturePhase::Listening { .. }) {
                        state.phase = CapturePhase::Idle;
                        EventAction::WindDown
                    } else {
                        EventAction::None
                    }
                }
                RecognizerEvent::Error(message) => {
                    state.phase = CapturePhase::Failed(message);
                    EventAction::WindDown
                }
            }
        };

        match action {
            EventAction::None => {}
            EventAction::WindDown => {
                self.recognizer.stop().await;
                self.microphone.close().await;
            }
            EventAction::Submit(transcript) => {
                self.recognizer.stop().await;
                self.microphone.close().await;
                match self.submit(transcript).await {
                    Ok(question_id) => {
                        info!(question_id = %question_id, "submitted captured question");
                        let mut state = self.lock_state();
                        if state.generation == generation {
                            state.phase = CapturePhase::Idle;
                        }
                    }
                    Err(e) => self.fail(generation, e.to_string()),
                }
            }
        }
    }

    /// Resolves the submitter's profile, writes the question, and notifies
    /// watchers of the event.
    async fn submit(&self, transcript: String) -> Result<String, VoiceError> {
        let pool = self.pool.clone();
        let user_id = self.user_id.clone();
        let event_id = self.event_id.clone();
        let language = self.language.clone();

        let question = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| VoiceError::Submit(e.to_string()))?;
            let profile = find_profile_by_user(&conn, &user_id).map_err(|e| match e {
                StoreError::NotFound(message) => VoiceError::NotFound(message),
                other => VoiceError::Submit(other.to_string()),
            })?;
            create_question(
                &conn,
                &CreateQuestionParams {
                    event_id,
                    participant_id: profile.id,
                    content: transcript,
                    language,
                },
            )
            .map_err(|e| VoiceError::Submit(e.to_string()))
        })
        .await
        .map_err(|e| VoiceError::Submit(e.to_string()))??;

        self.hub.publish(
            &self.event_id,
            ChangeNotification::new(StoreTable::Questions, ChangeOp::Insert, &question.id),
        );
        Ok(question.id)
    }

    fn fail(&self, generation: u64, message: String) {
        let mut state = self.lock_state();
        if state.generation == generation {
            state.phase = CapturePhase::Failed(message);
        }
    }

    // Phase and generation are written together under the lock, so a guard
    // recovered from a poisoned lock still holds a coherent state.
    fn lock_state(&self) -> std::sync::MutexGuard<'_, CaptureState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
