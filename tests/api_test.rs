// ============================================================================
// HTTP API Tests
// ============================================================================
//
// End-to-end coverage of the conceptual HTTP surface against an app spawned
// on a random port with in-memory stores, including the full send -> poll
// loop driven by the real client orchestrator and HTTP transport.
//
// ============================================================================

use duet_messaging::db::MessageLog;
use duet_messaging::poller::{ConversationPoller, HttpPollClient, PollerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

mod test_utils;
use test_utils::{spawn_app, spawn_unavailable_app, TestApp};

async fn send(app: &TestApp, sender: Uuid, recipient: Uuid, body: &str) -> reqwest::Response {
    app.http
        .post(format!("{}/messages", app.address))
        .header("X-User-Id", sender.to_string())
        .json(&json!({ "recipientId": recipient.to_string(), "body": body }))
        .send()
        .await
        .unwrap()
}

async fn poll(app: &TestApp, user: Uuid, query: &str) -> reqwest::Response {
    app.http
        .get(format!("{}/messages/poll/{}{}", app.address, user, query))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn send_returns_the_created_message() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    let response = send(&app, alice, bob, "  Hello Bob  ").await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let message = &body["message"];
    assert_eq!(message["senderId"], alice.to_string());
    assert_eq!(message["recipientId"], bob.to_string());
    assert_eq!(message["body"], "Hello Bob");
    assert!(message["createdAt"].as_i64().unwrap() > 0);
    Uuid::parse_str(message["id"].as_str().unwrap()).unwrap();
}

#[tokio::test]
async fn send_rejects_invalid_input() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    // Empty body
    assert_eq!(send(&app, alice, bob, "").await.status(), 400);
    // Oversized body
    assert_eq!(send(&app, alice, bob, &"a".repeat(1001)).await.status(), 400);

    // Malformed recipient id
    let response = app
        .http
        .post(format!("{}/messages", app.address))
        .header("X-User-Id", alice.to_string())
        .json(&json!({ "recipientId": "not-a-uuid", "body": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Missing caller identity
    let response = app
        .http
        .post(format!("{}/messages", app.address))
        .json(&json!({ "recipientId": bob.to_string(), "body": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn send_to_unknown_recipient_is_404() {
    let app = spawn_app().await;
    let alice = app.register_user();

    let response = send(&app, alice, Uuid::new_v4(), "hi").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn poll_scenario_hello_then_empty() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    let response = send(&app, alice, bob, "hello").await;
    let body: Value = response.json().await.unwrap();
    let t0 = body["message"]["createdAt"].as_i64().unwrap();

    let response = poll(&app, bob, &format!("?since={}", t0 - 1000)).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["body"], "hello");
    assert_eq!(messages[0]["from"], alice.to_string());
    assert_eq!(messages[0]["to"], bob.to_string());

    let response = poll(&app, bob, &format!("?since={}", t0)).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn poll_validates_the_user_id() {
    let app = spawn_app().await;

    let response = app
        .http
        .get(format!("{}/messages/poll/not-a-uuid", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = poll(&app, Uuid::new_v4(), "").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn poll_ignores_an_unparseable_cursor() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    send(&app, alice, bob, "one").await;
    send(&app, alice, bob, "two").await;

    // Garbage cursor falls back to the full recent window, not an error.
    let response = poll(&app, bob, "?since=three-days-ago").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn poll_clamps_the_limit() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    for i in 0..5 {
        send(&app, alice, bob, &format!("m{}", i)).await;
    }

    let response = poll(&app, bob, "?limit=2").await;
    let body: Value = response.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["body"], "m3");
    assert_eq!(messages[1]["body"], "m4");

    // Out-of-range limits fall back to the default window of 50.
    let response = poll(&app, bob, "?limit=0").await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn fast_store_outage_is_503_but_sends_stay_durable() {
    let (address, log, http) = spawn_unavailable_app().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    log.insert_user(alice);
    log.insert_user(bob);

    // The send succeeds: durable write first, fast path swallowed.
    let response = http
        .post(format!("{}/messages", address))
        .header("X-User-Id", alice.to_string())
        .json(&json!({ "recipientId": bob.to_string(), "body": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(log.fetch_since(bob, None).await.unwrap().len(), 1);

    // The poll reports the outage distinctly, never as an empty success.
    let response = http
        .get(format!("{}/messages/poll/{}", address, bob))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "FAST_STORE_UNAVAILABLE");

    // Health reflects the same outage.
    let response = http
        .get(format!("{}/health", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn conversation_history_reads_the_durable_log_and_clears_unread() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    send(&app, alice, bob, "hi bob").await;
    send(&app, bob, alice, "hi alice").await;
    send(&app, alice, bob, "how are you?").await;

    let response = app
        .http
        .get(format!("{}/messages/unread/{}", app.address, alice))
        .header("X-User-Id", bob.to_string())
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 2);

    let response = app
        .http
        .get(format!("{}/messages/conversation/{}", app.address, alice))
        .header("X-User-Id", bob.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["body"], "hi bob");
    assert_eq!(messages[1]["body"], "hi alice");
    assert_eq!(messages[2]["body"], "how are you?");

    // Reading the conversation cleared the unread counter.
    let response = app
        .http
        .get(format!("{}/messages/unread/{}", app.address, alice))
        .header("X-User-Id", bob.to_string())
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 0);

    // Unknown partner
    let response = app
        .http
        .get(format!("{}/messages/conversation/{}", app.address, Uuid::new_v4()))
        .header("X-User-Id", bob.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn reconcile_backfills_from_the_durable_log() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    for i in 0..3 {
        send(&app, alice, bob, &format!("m{}", i)).await;
    }

    let response = app
        .http
        .get(format!("{}/messages/reconcile?since=0", app.address))
        .header("X-User-Id", bob.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn typing_indicator_round_trip() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    let response = app
        .http
        .post(format!("{}/messages/typing/{}", app.address, bob))
        .header("X-User-Id", alice.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app
        .http
        .get(format!("{}/messages/typing/{}", app.address, alice))
        .header("X-User-Id", bob.to_string())
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["typing"], true);

    // Nobody is typing toward Alice from Bob's side.
    let response = app
        .http
        .get(format!("{}/messages/typing/{}", app.address, bob))
        .header("X-User-Id", alice.to_string())
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["typing"], false);
}

#[tokio::test]
async fn presence_round_trip() {
    let app = spawn_app().await;
    let alice = app.register_user();

    let response = app
        .http
        .post(format!("{}/presence/heartbeat", app.address))
        .header("X-User-Id", alice.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app
        .http
        .get(format!("{}/presence/{}", app.address, alice))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["online"], true);

    let response = app
        .http
        .get(format!("{}/presence/online", app.address))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert!(body["users"]
        .as_array()
        .unwrap()
        .iter()
        .any(|u| u == &Value::String(alice.to_string())));

    let response = app
        .http
        .delete(format!("{}/presence", app.address))
        .header("X-User-Id", alice.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app
        .http
        .get(format!("{}/presence/{}", app.address, alice))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["online"], false);
}

#[tokio::test]
async fn metrics_are_exposed_in_text_format() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    send(&app, alice, bob, "hello").await;

    let response = app
        .http
        .get(format!("{}/metrics", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("duet_messages_sent_total"));
}

#[tokio::test]
async fn orchestrator_delivers_over_the_real_http_transport() {
    let app = spawn_app().await;
    let alice = app.register_user();
    let bob = app.register_user();

    let transport = Arc::new(
        HttpPollClient::new(app.address.clone(), Duration::from_secs(5)).unwrap(),
    );
    let config = PollerConfig {
        interval: Duration::from_millis(50),
        ..PollerConfig::default()
    };

    // Bob opens the conversation with Alice before anything was sent.
    let poller = ConversationPoller::new(bob, transport, config);
    let handle = poller.open_at(alice, 0);
    let mut rx = handle.subscribe();

    send(&app, alice, bob, "hello").await;

    let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("batch within deadline")
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].body, "hello");
    assert_eq!(batch[0].from, alice);

    poller.close();
}
