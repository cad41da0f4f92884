//! Spoken-answer pipeline.
//!
//! Runs one question through generate, synthesize, play. At most one response
//! plays at a time: starting a new response stops the current playback before
//! anything else happens. Muting stops playback and suppresses the audio
//! stages of responses started while muted; the text answer is still produced
//! so it can be shown.

use crate::error::VoiceError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Produces the text of an answer to a question.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str) -> Result<String, VoiceError>;
}

/// Turns answer text into playable audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, VoiceError>;
}

/// Plays audio to the room. `play` resolves when playback finishes or is
/// stopped.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: Vec<u8>) -> Result<(), VoiceError>;
    async fn stop(&self);
}

/// Where the pipeline currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    Generating,
    Synthesizing,
    Playing,
    Failed(String),
}

struct PipelineState {
    phase: PipelinePhase,
    generation: u64,
    muted: bool,
}

/// Moderator-side pipeline answering approved questions aloud.
pub struct AnswerPipeline {
    generator: Arc<dyn AnswerGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    voice: String,
    state: Mutex<PipelineState>,
}

impl AnswerPipeline {
    pub fn new(
        generator: Arc<dyn AnswerGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            sink,
            voice: voice.into(),
            state: Mutex::new(PipelineState {
                phase: PipelinePhase::Idle,
                generation: 0,
                muted: false,
            }),
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.lock_state().phase.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.lock_state().muted
    }

    /// Answers one question aloud, returning the answer text.
    ///
    /// Any response still playing is stopped first. If the pipeline is muted,
    /// or gets muted while the text is being generated, the audio stages are
    /// skipped and only the text comes back.
    pub async fn respond(&self, question: &str) -> Result<String, VoiceError> {
        let generation = {
            let mut state = self.lock_state();
            state.generation += 1;
            state.phase = PipelinePhase::Generating;
            state.generation
        };
        // Supersede whatever was playing before this response.
        self.sink.stop().await;

        let text = match self.generator.generate(question).await {
            Ok(text) if text.trim().is_empty() => {
                let err = VoiceError::Synthesis("generator returned an empty answer".to_string());
                self.fail(generation, err.to_string());
                return Err(err);
            }
            Ok(text) => text,
            Err(e) => {
                self.fail(generation, e.to_string());
                return Err(e);
            }
        };

        if !self.advance(generation, PipelinePhase::Synthesizing) {
            debug!("response superseded before synthesis, returning text only");
            return Ok(text);
        }

        let audio = match self.synthesizer.synthesize(&text, &self.voice).await {
            Ok(audio) if audio.is_empty() => {
                let err = VoiceError::Synthesis("synthesizer returned no audio".to_string());
                self.fail(generation, err.to_string());
                return Err(err);
            }
            Ok(audio) => audio,
            Err(e) => {
                self.fail(generation, e.to_string());
                return Err(e);
            }
        };

        if !self.advance(generation, PipelinePhase::Playing) {
            debug!("response superseded before playback, returning text only");
            return Ok(text);
        }

        info!(bytes = audio.len(), "playing synthesized answer");
        if let Err(e) = self.sink.play(audio).await {
            self.fail(generation, e.to_string());
            return Err(e);
        }

        self.advance(generation, PipelinePhase::Idle);
        Ok(text)
    }

    /// Flips the mute switch. Muting stops playback immediately.
    pub async fn toggle_mute(&self) -> bool {
        let muted = {
            let mut state = self.lock_state();
            state.muted = !state.muted;
            if state.muted {
                // Invalidate the audio stages of any response in flight.
                state.generation += 1;
                state.phase = PipelinePhase::Idle;
            }
            state.muted
        };
        if muted {
            self.sink.stop().await;
        }
        muted
    }

    /// Stops playback and resets to idle without touching the mute switch.
    pub async fn stop(&self) {
        {
            let mut state = self.lock_state();
            state.generation += 1;
            state.phase = PipelinePhase::Idle;
        }
        self.sink.stop().await;
    }

    /// Moves to `phase` unless this response has been superseded or the
    /// pipeline is muted. Returns whether the response may continue.
    fn advance(&self, generation: u64, phase: PipelinePhase) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation {
            return false;
        }
        if state.muted {
            state.phase = PipelinePhase::Idle;
            return false;
        }
        state.phase = phase;
        true
    }

    fn fail(&self, generation: u64, message: String) {
        let mut state = self.lock_state();
        if state.generation == generation {
            state.phase = PipelinePhase::Failed(message);
        }
    }

    // Phase, generation, and the mute flag are written together under the
    // lock, so a guard recovered from a poisoned lock is coherent.
    fn lock_state(&self) -> std::sync::MutexGuard<'_, PipelineState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
