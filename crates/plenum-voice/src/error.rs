use thiserror::Error;

/// Errors across the capture and answer pipelines.
///
/// None of these are retried automatically anywhere in the crate; a caller
/// that wants another attempt starts one explicitly.
#[derive(Error, Debug)]
pub enum VoiceError {
    /// The user or platform refused microphone access.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Speech recognition could not produce a transcript.
    #[error("speech recognition failed: {0}")]
    Recognition(String),

    /// The transcript could not be written as a question.
    #[error("question submission failed: {0}")]
    Submit(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Text-to-speech produced no usable audio.
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    /// The synthesis backend could not be reached at all.
    #[error("voice backend unavailable: {0}")]
    BackendUnavailable(String),
}
