use async_trait::async_trait;
use axum::{extract::Path, http::StatusCode as AxumStatus, routing::post, Router};
use base64::Engine;
use plenum_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use plenum_realtime::RealtimeHub;
use plenum_server::{app, AppState};
use plenum_store::{create_profile, CreateProfileParams};
use plenum_voice::{
    AnswerPipeline, AudioSink, ContextualResponder, HttpSynthesizer, SpeechSynthesizer, VoiceError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

mod stub_synth;

struct TestServer {
    url: String,
    pool: DbPool,
    _dir: tempfile::TempDir,
}

async fn spawn_server_with(synthesizer: Arc<dyn SpeechSynthesizer>) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }

    let state = AppState {
        pool: pool.clone(),
        hub: Arc::new(RealtimeHub::new()),
        responder: ContextualResponder,
        synthesizer,
        default_voice: "alloy".to_string(),
    };

    let app = app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        url: format!("http://{}", addr),
        pool,
        _dir: dir,
    }
}

fn seed_profile(pool: &DbPool, user_id: &str) -> String {
    let conn = pool.get().unwrap();
    create_profile(
        &conn,
        &CreateProfileParams {
            user_id: user_id.to_string(),
            email: format!("{user_id}@example.com"),
            full_name: None,
            role: None,
        },
    )
    .unwrap()
    .id
}

#[tokio::test]
async fn voice_response_returns_encoded_audio_and_text() {
    let server = spawn_server_with(stub_synth::fixed_audio()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/voice-response", server.url))
        .json(&json!({ "question": "How does this work?", "eventId": "evt-1" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    let audio = base64::engine::general_purpose::STANDARD
        .decode(body["audioContent"].as_str().unwrap())
        .unwrap();
    assert_eq!(audio, b"fake-mpeg-bytes");
    assert!(!body["responseText"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn missing_question_is_rejected() {
    let server = spawn_server_with(stub_synth::fixed_audio()).await;
    let client = reqwest::Client::new();

    for payload in [json!({}), json!({ "question": "   " })] {
        let response = client
            .post(format!("{}/api/voice-response", server.url))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Question is required");
    }
}

#[tokio::test]
async fn synthesis_failure_surfaces_as_error_body() {
    let server = spawn_server_with(stub_synth::failing()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/voice-response", server.url))
        .json(&json!({ "question": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("provider"));
}

/// Boots a stand-in synthesis provider and runs the whole RPC through the
/// real HTTP synthesizer.
#[tokio::test]
async fn http_synthesizer_round_trip_through_provider() {
    let provider = Router::new().route(
        "/v1/text-to-speech/{voice}",
        post(|Path(voice): Path<String>, body: String| async move {
            assert_eq!(voice, "alloy");
            let request: Value = serde_json::from_str(&body).unwrap();
            assert!(!request["text"].as_str().unwrap().is_empty());
            assert_eq!(request["model_id"], "eleven_multilingual_v2");
            b"provider-mpeg".to_vec()
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let provider_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, provider).await.unwrap();
    });

    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(HttpSynthesizer::new(
        format!("http://{}", provider_addr),
        "test-key".to_string(),
    ));
    let server = spawn_server_with(synthesizer).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/voice-response", server.url))
        .json(&json!({ "question": "hello there" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    let audio = base64::engine::general_purpose::STANDARD
        .decode(body["audioContent"].as_str().unwrap())
        .unwrap();
    assert_eq!(audio, b"provider-mpeg");
}

#[tokio::test]
async fn provider_rejection_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let provider = Router::new().route(
        "/v1/text-to-speech/{voice}",
        post(move || {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                AxumStatus::UNAUTHORIZED
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let provider_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, provider).await.unwrap();
    });

    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(HttpSynthesizer::new(
        format!("http://{}", provider_addr),
        "bad-key".to_string(),
    ));
    let server = spawn_server_with(synthesizer).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/voice-response", server.url))
        .json(&json!({ "question": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("401"));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one provider call");
}

struct HeldSink {
    playing: AtomicUsize,
    released: Notify,
}

#[async_trait]
impl AudioSink for HeldSink {
    async fn play(&self, _audio: Vec<u8>) -> Result<(), VoiceError> {
        self.playing.fetch_add(1, Ordering::SeqCst);
        self.released.notified().await;
        self.playing.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.released.notify_waiters();
    }
}

/// Deleting the question that is being answered does not interrupt the
/// answer: the pipeline holds only text and audio, never the record.
#[tokio::test]
async fn deleting_question_mid_playback_leaves_playback_running() {
    let server = spawn_server_with(stub_synth::fixed_audio()).await;
    let moderator_id = seed_profile(&server.pool, "auth-mod");
    seed_profile(&server.pool, "auth-asker");
    let client = reqwest::Client::new();

    let event: Value = client
        .post(format!("{}/api/events", server.url))
        .json(&json!({ "title": "Town Hall", "moderator_id": moderator_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let event_id = event["id"].as_str().unwrap();

    let question: Value = client
        .post(format!("{}/api/events/{}/questions", server.url, event_id))
        .json(&json!({ "user_id": "auth-asker", "content": "How does this work?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let question_id = question["id"].as_str().unwrap();
    let content = question["content"].as_str().unwrap().to_string();

    let sink = Arc::new(HeldSink {
        playing: AtomicUsize::new(0),
        released: Notify::new(),
    });
    let pipeline = Arc::new(AnswerPipeline::new(
        Arc::new(ContextualResponder),
        stub_synth::fixed_audio(),
        Arc::clone(&sink) as Arc<dyn AudioSink>,
        "alloy",
    ));

    let responding = Arc::clone(&pipeline);
    let handle = tokio::spawn(async move { responding.respond(&content).await });
    for _ in 0..200 {
        if sink.playing.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(sink.playing.load(Ordering::SeqCst), 1);

    // Delete the question while its answer is still playing.
    let response = client
        .delete(format!("{}/api/questions/{}", server.url, question_id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // Playback is untouched by the delete.
    assert_eq!(sink.playing.load(Ordering::SeqCst), 1);

    let questions: Vec<Value> = client
        .get(format!("{}/api/events/{}/questions", server.url, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(questions.is_empty());

    pipeline.stop().await;
    let text = handle.await.unwrap().unwrap();
    assert!(!text.is_empty());
}
