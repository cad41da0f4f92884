//! Hosted text-to-speech over HTTP.

use crate::error::VoiceError;
use crate::pipeline::SpeechSynthesizer;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// Timeout for one synthesis request.
const SYNTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum text input size for synthesis (64 KiB).
const MAX_SYNTH_INPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

/// Synthesizer backed by an ElevenLabs-compatible HTTP API.
///
/// The base URL is configurable so tests and self-hosted gateways can stand
/// in for the real service.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, VoiceError> {
        if self.api_key.is_empty() {
            return Err(VoiceError::Synthesis(
                "synthesis API key not configured".to_string(),
            ));
        }
        if text.len() > MAX_SYNTH_INPUT_BYTES {
            return Err(VoiceError::Synthesis(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_SYNTH_INPUT_BYTES
            )));
        }

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice);
        debug!(voice, bytes = text.len(), "requesting speech synthesis");

        let response = self
            .client
            .post(&url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .timeout(SYNTH_TIMEOUT)
            .json(&SynthesisRequest {
                text,
                model_id: "eleven_multilingual_v2",
                voice_settings: VoiceSettings::default(),
            })
            .send()
            .await
            .map_err(|e| VoiceError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "synthesis provider rejected request: {body}");
            return Err(VoiceError::Synthesis(format!(
                "provider returned {status}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| VoiceError::BackendUnavailable(e.to_string()))?;
        if audio.is_empty() {
            return Err(VoiceError::Synthesis(
                "provider returned no audio".to_string(),
            ));
        }
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_is_rejected_before_any_request() {
        let synth = HttpSynthesizer::new("http://127.0.0.1:9", "");
        let err = synth.synthesize("hello", "alloy").await.unwrap_err();
        assert!(matches!(err, VoiceError::Synthesis(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_backend_unavailable() {
        // Port 9 (discard) refuses connections on loopback.
        let synth = HttpSynthesizer::new("http://127.0.0.1:9", "key");
        let err = synth.synthesize("hello", "alloy").await.unwrap_err();
        assert!(matches!(err, VoiceError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn oversized_text_is_rejected() {
        let synth = HttpSynthesizer::new("http://127.0.0.1:9", "key");
        let text = "a".repeat(MAX_SYNTH_INPUT_BYTES + 1);
        let err = synth.synthesize(&text, "alloy").await.unwrap_err();
        assert!(matches!(err, VoiceError::Synthesis(_)));
    }
}
