// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end relay scenarios over the HTTP surface.
//!
//! Each test creates an isolated TestHarness with a temp SQLite database.
//! Tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use serde_json::{Value, json};

use chatbridge_config::RelaySettings;
use chatbridge_core::RelayStore;
use chatbridge_test_utils::{TEST_ADMIN_KEY, TEST_API_KEY, TestHarness};

async fn send_message(h: &TestHarness, session_id: &str, message: &str) -> Value {
    let (status, body) = h
        .post_json(
            "/api/v1/messages",
            None,
            json!({"session_id": session_id, "message": message}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "message submit failed: {body}");
    body["data"].clone()
}

async fn send_response(h: &TestHarness, session_id: &str, text: &str, message_id: Option<i64>) -> Value {
    let mut payload = json!({"session_id": session_id, "response": text});
    if let Some(id) = message_id {
        payload["message_id"] = json!(id);
    }
    let (status, body) = h
        .post_json("/api/v1/outbox", Some(TEST_API_KEY), payload)
        .await;
    assert_eq!(status, StatusCode::OK, "outbox failed: {body}");
    body["data"].clone()
}

// ---- The demo conversation ----

#[tokio::test]
async fn demo_conversation_round_trip() {
    let h = TestHarness::new().await.unwrap();

    let accepted = send_message(&h, "session_demo_1", "hello").await;
    assert_eq!(accepted["message_id"], 1);
    assert_eq!(accepted["is_new_user"], true);

    let (_, inbox) = h.get("/api/v1/inbox", Some(TEST_API_KEY)).await;
    let messages = inbox["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "hello");
    assert_eq!(messages[0]["processed"], false);
    assert_eq!(messages[0]["uid"], accepted["uid"]);

    let reply = send_response(&h, "session_demo_1", "hi there", Some(1)).await;
    assert_eq!(reply["response_id"], 1);

    let (status, polled) = h
        .get("/api/v1/responses?session_id=session_demo_1", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let responses = polled["data"]["responses"].as_array().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["response"], "hi there");
    assert_eq!(responses[0]["message_id"], 1);

    // The message was delivered once and only once.
    let (_, inbox) = h.get("/api/v1/inbox", Some(TEST_API_KEY)).await;
    assert!(inbox["data"]["messages"].as_array().unwrap().is_empty());
}

// ---- Ordering ----

#[tokio::test]
async fn responses_keep_creation_order_across_interleaved_messages() {
    let h = TestHarness::new().await.unwrap();
    send_message(&h, "session_order", "q1").await;

    send_response(&h, "session_order", "R1", None).await;
    send_message(&h, "session_order", "q2").await;
    send_response(&h, "session_order", "R2", None).await;
    send_message(&h, "session_order", "q3").await;
    send_response(&h, "session_order", "R3", None).await;

    let (_, polled) = h
        .get("/api/v1/responses?session_id=session_order", None)
        .await;
    let texts: Vec<&str> = polled["data"]["responses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["response"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["R1", "R2", "R3"]);
}

#[tokio::test]
async fn since_cursor_filters_responses() {
    let h = TestHarness::new().await.unwrap();
    send_message(&h, "session_since", "q").await;
    send_response(&h, "session_since", "early", None).await;

    let (_, polled) = h
        .get("/api/v1/responses?session_id=session_since", None)
        .await;
    let cursor = polled["data"]["responses"][0]["created_at"]
        .as_str()
        .unwrap()
        .to_string();

    tokio::time::sleep(Duration::from_millis(5)).await;
    send_response(&h, "session_since", "late", None).await;

    let (_, polled) = h
        .get(
            &format!("/api/v1/responses?session_id=session_since&since={cursor}"),
            None,
        )
        .await;
    let responses = polled["data"]["responses"].as_array().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["response"], "late");
}

// ---- Pagination and delivery ----

#[tokio::test]
async fn inbox_drains_in_pages() {
    let h = TestHarness::new().await.unwrap();
    for i in 0..25 {
        send_message(&h, "session_bulk", &format!("m{i}")).await;
    }

    let (_, first) = h.get("/api/v1/inbox?limit=10", Some(TEST_API_KEY)).await;
    assert_eq!(first["data"]["messages"].as_array().unwrap().len(), 10);
    assert_eq!(first["data"]["messages"][0]["message"], "m0");
    assert_eq!(first["data"]["pagination"]["total"], 25);
    assert_eq!(first["data"]["pagination"]["has_more"], true);

    let (_, second) = h.get("/api/v1/inbox?limit=10", Some(TEST_API_KEY)).await;
    assert_eq!(second["data"]["messages"][0]["message"], "m10");
    assert_eq!(second["data"]["pagination"]["total"], 15);

    let (_, third) = h.get("/api/v1/inbox?limit=10", Some(TEST_API_KEY)).await;
    assert_eq!(third["data"]["messages"].as_array().unwrap().len(), 5);
    assert_eq!(third["data"]["pagination"]["total"], 5);
    assert_eq!(third["data"]["pagination"]["has_more"], false);
}

// ---- Session creation ----

#[tokio::test]
async fn response_poll_then_message_is_not_a_new_user() {
    let h = TestHarness::new().await.unwrap();
    let (status, _) = h
        .get("/api/v1/responses?session_id=session_poll_first", None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let accepted = send_message(&h, "session_poll_first", "hello").await;
    assert_eq!(accepted["is_new_user"], false);
}

#[tokio::test]
async fn concurrent_first_messages_create_one_session() {
    let h = Arc::new(TestHarness::new().await.unwrap());

    let mut tasks = Vec::new();
    for i in 0..10 {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            h.post_json(
                "/api/v1/messages",
                None,
                json!({"session_id": "session_race", "message": format!("m{i}")}),
            )
            .await
        }));
    }

    let mut new_users = 0;
    let mut uids = Vec::new();
    for task in tasks {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK, "{body}");
        if body["data"]["is_new_user"] == true {
            new_users += 1;
        }
        uids.push(body["data"]["uid"].as_str().unwrap().to_string());
    }

    assert_eq!(new_users, 1);
    uids.dedup();
    assert_eq!(uids.len(), 1);
    assert_eq!(h.store.get_session_count(false).await.unwrap(), 1);
}

#[tokio::test]
async fn rejected_session_id_leaves_store_empty() {
    let h = TestHarness::new().await.unwrap();
    let (status, body) = h
        .post_json(
            "/api/v1/messages",
            None,
            json!({"session_id": "bad id!", "message": "hello"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(h.store.get_session_count(false).await.unwrap(), 0);
    assert_eq!(h.store.get_unprocessed_message_count(None).await.unwrap(), 0);
}

// ---- Cleanup ----

#[tokio::test]
async fn cleanup_removes_only_idle_sessions() {
    let settings = RelaySettings {
        session_timeout: 1,
        ..RelaySettings::default()
    };
    let h = TestHarness::builder()
        .with_settings(settings)
        .build()
        .await
        .unwrap();

    send_message(&h, "session_idle", "old").await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    send_message(&h, "session_fresh", "new").await;

    let (status, body) = h
        .post_json("/api/v1/cleanup", Some(TEST_ADMIN_KEY), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleaned_count"], 1);

    let (_, listing) = h
        .get("/api/v1/sessions?active=false", Some(TEST_ADMIN_KEY))
        .await;
    let sessions = listing["data"]["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["session_id"], "session_fresh");

    // The idle session's message went with it.
    let (_, inbox) = h.get("/api/v1/inbox", Some(TEST_API_KEY)).await;
    let messages = inbox["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "new");
}

// ---- Live settings ----

#[tokio::test]
async fn config_change_applies_to_next_request() {
    let h = TestHarness::new().await.unwrap();

    let (status, _) = h
        .post_json(
            "/api/v1/config",
            Some(TEST_ADMIN_KEY),
            json!({"rate_limit_messages": "1", "max_message_length": 5}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h
        .post_json(
            "/api/v1/messages",
            None,
            json!({"session_id": "session_cfg", "message": "too long"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .post_json(
            "/api/v1/messages",
            None,
            json!({"session_id": "session_cfg", "message": "short"}),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
