// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::Pipeline;
use axum::http::StatusCode;
use axum_test::TestServer;
use propscout::domain::models::term::SearchTerm;
use propscout::domain::services::admission_gate::AdmissionGate;
use serde_json::{json, Value};
use uuid::Uuid;

async fn server(pipeline: &Pipeline) -> TestServer {
    TestServer::new(pipeline.app()).unwrap()
}

#[tokio::test]
async fn test_submit_and_query_job() {
    let pipeline = Pipeline::start().await;
    let server = server(&pipeline).await;

    let response = server
        .post("/v1/jobs")
        .json(&json!({ "search_term": "  Robert   Johnson ", "priority": 5 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["search_term"], "Robert Johnson");
    let id = body["id"].as_str().unwrap().to_string();

    let response = server.get(&format!("/v1/jobs/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let job: Value = response.json();
    assert_eq!(job["status"], "queued");
    assert_eq!(job["priority"], 5);
    assert_eq!(job["attempt_count"], 0);
}

#[tokio::test]
async fn test_rejections_map_to_status_codes() {
    let pipeline = Pipeline::start().await;
    let server = server(&pipeline).await;

    server
        .post("/v1/jobs")
        .json(&json!({ "search_term": "Johnson" }))
        .await;

    let duplicate = server
        .post("/v1/jobs")
        .json(&json!({ "search_term": "Johnson LLC" }))
        .await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
    assert_eq!(duplicate.json::<Value>()["reason"], "business_superset");

    let invalid = server
        .post("/v1/jobs")
        .json(&json!({ "search_term": "" }))
        .await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

    // another process admitted this term within the cooldown window
    pipeline
        .gate
        .can_schedule(&SearchTerm::new("Davis"))
        .await
        .unwrap();
    let limited = server
        .post("/v1/jobs")
        .json(&json!({ "search_term": "Davis" }))
        .await;
    assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.json::<Value>()["reason"], "rate_limited");

    let missing = server.get(&format!("/v1/jobs/{}", Uuid::new_v4())).await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batch_reports_each_term() {
    let pipeline = Pipeline::start().await;
    let server = server(&pipeline).await;

    let response = server
        .post("/v1/jobs/batch")
        .json(&json!({ "terms": ["Johnson", "Johnson Trust", "Ave", "Robert Johnson"] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["rejected"], 2);
    assert_eq!(body["results"][1]["reason"], "business_superset");
    assert_eq!(body["results"][2]["reason"], "too_short");
    assert!(body["results"][3]["id"].is_string());
}

#[tokio::test]
async fn test_retry_failed_endpoint() {
    let pipeline = Pipeline::start().await;
    let server = server(&pipeline).await;

    let response = server.post("/v1/jobs/retry-failed").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>(),
        json!({ "queued": 0, "rejected": 0 })
    );

    let invalid = server
        .post("/v1/jobs/retry-failed")
        .json(&json!({ "limit": 0 }))
        .await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_credential_queue_and_dedup() {
    let pipeline = Pipeline::start().await;
    let server = server(&pipeline).await;

    let degraded: Value = server.get("/health").await.json();
    assert_eq!(degraded["status"], "degraded");
    assert_eq!(degraded["credential"]["has_credential"], false);

    pipeline.broker.refresh_now().await.unwrap();
    server
        .post("/v1/jobs")
        .json(&json!({ "search_term": "Johnson" }))
        .await;

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["credential"]["refresh_count"], 1);
    assert_eq!(health["queue"]["queued"], 1);
    assert_eq!(health["dedup"]["accepted"], 1);
    assert_eq!(health["dedup"]["used_terms"], 1);
}

#[tokio::test]
async fn test_shutting_down_rejects_submissions() {
    let pipeline = Pipeline::start().await;
    let server = server(&pipeline).await;
    pipeline.shutdown.cancel();

    let response = server
        .post("/v1/jobs")
        .json(&json!({ "search_term": "Johnson" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_version() {
    let pipeline = Pipeline::start().await;
    let response = server(&pipeline).await.get("/v1/version").await;
    assert_eq!(response.text(), env!("CARGO_PKG_VERSION"));
}
