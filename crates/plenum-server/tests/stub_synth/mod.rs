//! Stub synthesizers for integration tests.

use async_trait::async_trait;
use plenum_voice::{SpeechSynthesizer, VoiceError};
use std::sync::Arc;

pub struct FixedAudioSynth;

#[async_trait]
impl SpeechSynthesizer for FixedAudioSynth {
    async fn synthesize(&self, _text: &str, _voice: &str) -> Result<Vec<u8>, VoiceError> {
        Ok(b"fake-mpeg-bytes".to_vec())
    }
}

pub struct FailingSynth;

#[async_trait]
impl SpeechSynthesizer for FailingSynth {
    async fn synthesize(&self, _text: &str, _voice: &str) -> Result<Vec<u8>, VoiceError> {
        Err(VoiceError::Synthesis("provider returned 401".to_string()))
    }
}

pub fn fixed_audio() -> Arc<dyn SpeechSynthesizer> {
    Arc::new(FixedAudioSynth)
}

#[allow(dead_code)]
pub fn failing() -> Arc<dyn SpeechSynthesizer> {
    Arc::new(FailingSynth)
}
