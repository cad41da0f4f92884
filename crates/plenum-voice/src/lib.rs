//! Voice capture and spoken-answer pipeline.
//!
//! Two state machines live here. [`VoiceCapture`] takes a participant from
//! microphone permission through recognition to a submitted question, and
//! [`AnswerPipeline`] takes an approved question through answer generation
//! and synthesis to playback. Both guard against late async results with
//! generation counters and neither ever retries a failed step on its own.
//!
//! Hardware and hosted services sit behind traits ([`Microphone`],
//! [`SpeechRecognizer`], [`SpeechSynthesizer`], [`AudioSink`]) so the
//! machines are testable without either.

mod capture;
mod error;
mod pipeline;
mod responder;
mod synth;

pub use capture::{
    CapturePhase, Microphone, RecognizerEvent, SpeechRecognizer, StartOutcome, VoiceCapture,
};
pub use error::VoiceError;
pub use pipeline::{AnswerGenerator, AnswerPipeline, AudioSink, PipelinePhase, SpeechSynthesizer};
pub use responder::ContextualResponder;
pub use synth::HttpSynthesizer;
