// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{search_page, Pipeline};
use propscout::domain::models::job::JobStatus;
use propscout::domain::models::term::SearchTerm;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_expired_credential_is_refreshed_and_retried_immediately() {
    let pipeline = Pipeline::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&pipeline.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(
            3,
            &[
                ("W-1", "WILLIAMS JOHN"),
                ("W-2", "WILLIAMS SARA"),
                ("W-3", "WILLIAMS FAMILY"),
            ],
        )))
        .expect(1)
        .mount(&pipeline.upstream)
        .await;

    let id = pipeline
        .admission
        .admit(SearchTerm::new("Williams"), 0)
        .await
        .unwrap();
    let worker = pipeline.worker();

    // one dequeue covers the failed attempt and its immediate retry
    assert!(worker.process_next_job().await.unwrap());

    let job = pipeline.job(id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.record_count, Some(3));
    assert_eq!(job.attempt_count, 2);
    assert_eq!(pipeline.provider.calls(), 2);
    assert_eq!(pipeline.broker.current().unwrap().token(), "token-2");
}

#[tokio::test]
async fn test_second_credential_failure_uses_standard_backoff() {
    let pipeline = Pipeline::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&pipeline.upstream)
        .await;

    let id = pipeline
        .admission
        .admit(SearchTerm::new("Williams"), 0)
        .await
        .unwrap();
    let worker = pipeline.worker();
    assert!(worker.process_next_job().await.unwrap());

    let job = pipeline.job(id).await;
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempt_count, 2);
    assert!(job.failure_reason.unwrap().contains("401"));
    assert_eq!(pipeline.provider.calls(), 2);
}

#[tokio::test]
async fn test_workers_share_a_refreshed_credential() {
    let pipeline = Pipeline::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&pipeline.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(0, &[])))
        .mount(&pipeline.upstream)
        .await;

    for term in ["Garcia", "Nguyen"] {
        pipeline
            .admission
            .admit(SearchTerm::new(term), 0)
            .await
            .unwrap();
    }

    let worker = pipeline.worker();
    assert_eq!(pipeline.drain(&worker).await, 2);

    // the second job starts with token-2 and never needs a refresh
    assert_eq!(pipeline.provider.calls(), 2);
    assert_eq!(pipeline.queue_counts().await.completed, 2);
}
