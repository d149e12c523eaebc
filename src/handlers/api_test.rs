use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tempfile::TempDir;

use crate::client_mock::FakeGraphClient;
use crate::handlers::api::AppState;
use crate::routes::create_router;
use crate::services::ingestor::ResponseIngestor;
use crate::services::notifier::NotificationDispatcher;
use crate::services::state_machine::NegotiationEngine;
use crate::services::store::NegotiationStore;
use crate::services::supervisor::PollSupervisor;

struct Harness {
    server: TestServer,
    graph: Arc<FakeGraphClient>,
    _dir: TempDir,
}

fn harness_with(graph: FakeGraphClient, is_production: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("negotiations.json");
    let store = Arc::new(NegotiationStore::new(path.to_str().unwrap()));
    let graph = Arc::new(graph);

    let engine = Arc::new(NegotiationEngine::new(
        Arc::clone(&graph) as Arc<dyn crate::client::GraphApi>,
        Arc::clone(&store),
        NotificationDispatcher::new("https://scheduler.example.com".to_string()),
    ));
    // Long interval: tests drive evaluation through the status endpoint
    let supervisor = Arc::new(PollSupervisor::new(
        Arc::clone(&engine),
        StdDuration::from_secs(3600),
    ));

    let app_state = Arc::new(AppState {
        engine,
        store: Arc::clone(&store),
        ingestor: ResponseIngestor::new(store),
        supervisor,
    });

    let server = TestServer::new(create_router(app_state, is_production)).unwrap();
    Harness {
        server,
        graph,
        _dir: dir,
    }
}

fn harness(candidates: usize) -> Harness {
    harness_with(
        FakeGraphClient::new("host@example.com")
            .with_attendee("a@example.com", "user-a")
            .with_attendee("b@example.com", "user-b")
            .with_suggestions(candidates),
        false,
    )
}

fn schedule_body() -> Value {
    let now = Utc::now();
    json!({
        "title": "Architecture review",
        "description": "Review the storage redesign",
        "duration_minutes": 30,
        "window_start": now.to_rfc3339(),
        "window_end": (now + Duration::days(5)).to_rfc3339(),
        "attendees": ["a@example.com", "b@example.com"]
    })
}

async fn schedule(h: &Harness) -> String {
    let response = h.server.post("/meetings/schedule").json(&schedule_body()).await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "waiting");
    body["negotiation_id"].as_str().unwrap().to_string()
}

async fn respond(h: &Harness, id: &str, tenant: &str, answer: &str) {
    let response = h
        .server
        .get("/webhook/response")
        .add_query_param("tenantId", tenant)
        .add_query_param("uuid", id)
        .add_query_param("response", answer)
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("Response recorded"));
}

#[tokio::test]
async fn test_health_check() {
    let h = harness(1);

    let response = h.server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn test_full_workflow_everyone_accepts() {
    let h = harness(2);
    let id = schedule(&h).await;

    // Both attendees received a proposal card
    assert_eq!(h.graph.sent_count(), 2);

    respond(&h, &id, "user-a", "accepted").await;
    respond(&h, &id, "user-b", "tentative").await;

    let response = h.server.get(&format!("/meeting-status/{}", id)).await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "done");
    assert_eq!(body["status_message"], "Meeting scheduled successfully");
    assert!(body["selected_time"].is_object());
    assert_eq!(body["attendees"].as_array().unwrap().len(), 2);

    assert_eq!(h.graph.event_count(), 1);
}

#[tokio::test]
async fn test_decline_retries_then_exhausts() {
    let h = harness(2);
    let id = schedule(&h).await;

    // First round: a decline moves the negotiation to the next candidate
    respond(&h, &id, "user-a", "accepted").await;
    respond(&h, &id, "user-b", "declined").await;

    let response = h.server.get(&format!("/meeting-status/{}", id)).await;
    let body: Value = response.json();
    assert_eq!(body["status"], "waiting");
    for attendee in body["attendees"].as_array().unwrap() {
        assert_eq!(attendee["status"], "pending");
    }

    // Second round: another decline exhausts the candidate list
    respond(&h, &id, "user-b", "declined").await;

    let response = h.server.get(&format!("/meeting-status/{}", id)).await;
    let body: Value = response.json();
    assert_eq!(body["status"], "failed");
    assert_eq!(body["status_message"], "Meeting scheduling failed");
    assert!(body["selected_time"].is_null());
    assert_eq!(h.graph.event_count(), 0);
}

#[tokio::test]
async fn test_schedule_with_no_attendees_is_rejected() {
    let h = harness(1);
    let now = Utc::now();

    let response = h
        .server
        .post("/meetings/schedule")
        .json(&json!({
            "title": "Empty meeting",
            "duration_minutes": 30,
            "window_start": now.to_rfc3339(),
            "window_end": (now + Duration::days(1)).to_rfc3339(),
            "attendees": []
        }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("invalid request"));
}

#[tokio::test]
async fn test_schedule_with_no_availability() {
    let h = harness(0);

    let response = h.server.post("/meetings/schedule").json(&schedule_body()).await;
    assert_eq!(response.status_code(), 422);
}

#[tokio::test]
async fn test_webhook_rejects_malformed_uuid() {
    let h = harness(1);

    let response = h
        .server
        .get("/webhook/response")
        .add_query_param("tenantId", "user-a")
        .add_query_param("uuid", "not-a-uuid")
        .add_query_param("response", "accepted")
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_webhook_rejects_unknown_response_value() {
    let h = harness(1);
    let id = schedule(&h).await;

    let response = h
        .server
        .get("/webhook/response")
        .add_query_param("tenantId", "user-a")
        .add_query_param("uuid", &id)
        .add_query_param("response", "maybe")
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_webhook_unknown_tenant_leaves_negotiation_unchanged() {
    let h = harness(1);
    let id = schedule(&h).await;

    let response = h
        .server
        .get("/webhook/response")
        .add_query_param("tenantId", "tenant-stranger")
        .add_query_param("uuid", &id)
        .add_query_param("response", "accepted")
        .await;
    assert_eq!(response.status_code(), 400);

    let status: Value = h
        .server
        .get(&format!("/meeting-status/{}", id))
        .await
        .json();
    assert_eq!(status["status"], "waiting");
    for attendee in status["attendees"].as_array().unwrap() {
        assert_eq!(attendee["status"], "pending");
    }
}

#[tokio::test]
async fn test_webhook_unknown_negotiation_is_not_found() {
    let h = harness(1);

    let response = h
        .server
        .get("/webhook/response")
        .add_query_param("tenantId", "user-a")
        .add_query_param("uuid", &uuid::Uuid::new_v4().to_string())
        .add_query_param("response", "accepted")
        .await;

    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_status_for_unknown_negotiation() {
    let h = harness(1);

    let response = h
        .server
        .get(&format!("/meeting-status/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_debug_route_only_in_development() {
    let dev = harness(1);
    let id = schedule(&dev).await;

    let response = dev.server.get(&format!("/negotiations/{}", id)).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["id"].as_str().unwrap(), id);
    assert!(body["candidate_slots"].is_array());

    let prod = harness_with(
        FakeGraphClient::new("host@example.com")
            .with_attendee("a@example.com", "user-a")
            .with_attendee("b@example.com", "user-b")
            .with_suggestions(1),
        true,
    );
    let id = schedule(&prod).await;
    let response = prod.server.get(&format!("/negotiations/{}", id)).await;
    assert_eq!(response.status_code(), 404);
}
