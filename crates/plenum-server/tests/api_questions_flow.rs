use plenum_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use plenum_realtime::RealtimeHub;
use plenum_server::{app, AppState};
use plenum_store::{create_profile, CreateProfileParams};
use plenum_voice::ContextualResponder;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

mod stub_synth;

struct TestServer {
    url: String,
    pool: DbPool,
    hub: Arc<RealtimeHub>,
    _dir: tempfile::TempDir,
}

async fn spawn_server() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }
    let hub = Arc::new(RealtimeHub::new());

    let state = AppState {
        pool: pool.clone(),
        hub: Arc::clone(&hub),
        responder: ContextualResponder,
        synthesizer: stub_synth::fixed_audio(),
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
        hub,
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

async fn create_event(client: &reqwest::Client, server: &TestServer, moderator_id: &str) -> Value {
    let response = client
        .post(format!("{}/api/events", server.url))
        .json(&json!({ "title": "Town Hall", "moderator_id": moderator_id }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    response.json().await.unwrap()
}

#[tokio::test]
async fn submit_approve_notify_requery() {
    let server = spawn_server().await;
    let moderator_id = seed_profile(&server.pool, "auth-mod");
    seed_profile(&server.pool, "auth-asker");
    let client = reqwest::Client::new();

    let event = create_event(&client, &server, &moderator_id).await;
    let event_id = event["id"].as_str().unwrap();
    assert_eq!(event["status"], "active");

    let mut notifications = server.hub.subscribe(event_id);

    // Submit a question; it starts pending.
    let response = client
        .post(format!("{}/api/events/{}/questions", server.url, event_id))
        .json(&json!({ "user_id": "auth-asker", "content": "How does this work?" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let question: Value = response.json().await.unwrap();
    assert_eq!(question["status"], "pending");
    let question_id = question["id"].as_str().unwrap();

    let inserted = notifications.recv().await.unwrap();
    assert_eq!(inserted.record_id, question_id);

    // Approve it.
    let response = client
        .patch(format!("{}/api/questions/{}", server.url, question_id))
        .json(&json!({ "status": "approved" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // The update is announced, and a re-query shows the new status.
    let updated = notifications.recv().await.unwrap();
    assert_eq!(updated.record_id, question_id);

    let response = client
        .get(format!("{}/api/events/{}/questions", server.url, event_id))
        .send()
        .await
        .unwrap();
    let questions: Vec<Value> = response.json().await.unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0]["status"], "approved");
}

#[tokio::test]
async fn http_writes_converge_into_live_sessions() {
    use plenum_session::{SessionController, SessionPhase};
    use std::time::Duration;

    let server = spawn_server().await;
    let moderator_id = seed_profile(&server.pool, "auth-mod");
    seed_profile(&server.pool, "auth-asker");
    let client = reqwest::Client::new();

    let event = create_event(&client, &server, &moderator_id).await;
    let event_id = event["id"].as_str().unwrap();

    // A client session watching the event through the same hub.
    let session = SessionController::new(server.pool.clone(), Arc::clone(&server.hub));
    session.select_event(event_id).await.unwrap();

    let question: Value = client
        .post(format!("{}/api/events/{}/questions", server.url, event_id))
        .json(&json!({ "user_id": "auth-asker", "content": "can you see me" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    for _ in 0..200 {
        if let SessionPhase::Ready(snapshot) = session.phase() {
            if snapshot.questions.iter().any(|q| q.id == question["id"]) {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session never observed the question submitted over HTTP");
}

#[tokio::test]
async fn illegal_transition_is_conflict() {
    let server = spawn_server().await;
    let moderator_id = seed_profile(&server.pool, "auth-mod");
    seed_profile(&server.pool, "auth-asker");
    let client = reqwest::Client::new();

    let event = create_event(&client, &server, &moderator_id).await;
    let event_id = event["id"].as_str().unwrap();

    let question: Value = client
        .post(format!("{}/api/events/{}/questions", server.url, event_id))
        .json(&json!({ "user_id": "auth-asker", "content": "first" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let question_id = question["id"].as_str().unwrap();

    // Reject it, then try to move it again. Rejected is terminal.
    let response = client
        .patch(format!("{}/api/questions/{}", server.url, question_id))
        .json(&json!({ "status": "rejected" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let response = client
        .patch(format!("{}/api/questions/{}", server.url, question_id))
        .json(&json!({ "status": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn pending_can_be_marked_answered_directly() {
    let server = spawn_server().await;
    let moderator_id = seed_profile(&server.pool, "auth-mod");
    seed_profile(&server.pool, "auth-asker");
    let client = reqwest::Client::new();

    let event = create_event(&client, &server, &moderator_id).await;
    let event_id = event["id"].as_str().unwrap();

    let question: Value = client
        .post(format!("{}/api/events/{}/questions", server.url, event_id))
        .json(&json!({ "user_id": "auth-asker", "content": "quick one" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = client
        .patch(format!(
            "{}/api/questions/{}",
            server.url,
            question["id"].as_str().unwrap()
        ))
        .json(&json!({ "status": "answered" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let answered: Value = response.json().await.unwrap();
    assert_eq!(answered["status"], "answered");
}

#[tokio::test]
async fn delete_removes_question_from_queries() {
    let server = spawn_server().await;
    let moderator_id = seed_profile(&server.pool, "auth-mod");
    seed_profile(&server.pool, "auth-asker");
    let client = reqwest::Client::new();

    let event = create_event(&client, &server, &moderator_id).await;
    let event_id = event["id"].as_str().unwrap();

    let question: Value = client
        .post(format!("{}/api/events/{}/questions", server.url, event_id))
        .json(&json!({ "user_id": "auth-asker", "content": "remove me" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let question_id = question["id"].as_str().unwrap();

    let response = client
        .delete(format!("{}/api/questions/{}", server.url, question_id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let questions: Vec<Value> = client
        .get(format!("{}/api/events/{}/questions", server.url, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(questions.is_empty());

    // Deleting again is 404.
    let response = client
        .delete(format!("{}/api/questions/{}", server.url, question_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_submitter_is_not_found() {
    let server = spawn_server().await;
    let moderator_id = seed_profile(&server.pool, "auth-mod");
    let client = reqwest::Client::new();

    let event = create_event(&client, &server, &moderator_id).await;
    let event_id = event["id"].as_str().unwrap();

    let response = client
        .post(format!("{}/api/events/{}/questions", server.url, event_id))
        .json(&json!({ "user_id": "auth-ghost", "content": "who am i" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn join_event_is_idempotent_over_http() {
    let server = spawn_server().await;
    let moderator_id = seed_profile(&server.pool, "auth-mod");
    let attendee_id = seed_profile(&server.pool, "auth-1");
    let client = reqwest::Client::new();

    let event = create_event(&client, &server, &moderator_id).await;
    let event_id = event["id"].as_str().unwrap();

    let first: Value = client
        .post(format!("{}/api/events/{}/participants", server.url, event_id))
        .json(&json!({ "profile_id": attendee_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: Value = client
        .post(format!("{}/api/events/{}/participants", server.url, event_id))
        .json(&json!({ "profile_id": attendee_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["id"], second["id"]);

    let participants: Vec<Value> = client
        .get(format!("{}/api/events/{}/participants", server.url, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0]["status"], "idle");
}
