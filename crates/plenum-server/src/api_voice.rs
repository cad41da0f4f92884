//! Voice-response RPC handler.

use crate::AppState;
use axum::{extract::Extension, http::StatusCode, response::Json};
use base64::Engine;
use plenum_voice::VoiceError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct VoiceResponseRequest {
    pub question: Option<String>,
    #[serde(rename = "eventId")]
    pub event_id: Option<String>,
    pub voice: Option<String>,
}

#[derive(Serialize)]
pub struct VoiceResponseBody {
    #[serde(rename = "audioContent")]
    pub audio_content: String,
    #[serde(rename = "responseText")]
    pub response_text: String,
}

/// POST /api/voice-response
///
/// Generates an answer to the question text and synthesizes it to audio.
/// Success returns `{audioContent, responseText}` with the audio base64
/// encoded; every failure returns `{error}` with a non-2xx status and is
/// never retried here.
pub async fn voice_response_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<VoiceResponseRequest>,
) -> Result<Json<VoiceResponseBody>, (StatusCode, Json<Value>)> {
    let question = match payload.question.as_deref().map(str::trim) {
        Some(question) if !question.is_empty() => question.to_string(),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Question is required" })),
            ))
        }
    };

    let event_id = payload.event_id.as_deref().unwrap_or("<none>");
    tracing::info!(event_id, question = %question, "processing voice response request");

    let response_text = state.responder.respond(&question);

    let voice = payload
        .voice
        .unwrap_or_else(|| state.default_voice.clone());
    let audio = state
        .synthesizer
        .synthesize(&response_text, &voice)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "voice synthesis failed");
            let status = match e {
                VoiceError::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, Json(json!({ "error": e.to_string() })))
        })?;

    let audio_content = base64::engine::general_purpose::STANDARD.encode(&audio);
    tracing::info!(bytes = audio.len(), "generated voice response");

    Ok(Json(VoiceResponseBody {
        audio_content,
        response_text,
    }))
}
