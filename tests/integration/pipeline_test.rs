// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{search_page, Pipeline};
use propscout::application::usecases::admit_term::AdmissionError;
use propscout::domain::models::job::JobStatus;
use propscout::domain::models::term::SearchTerm;
use propscout::domain::repositories::result_repository::ResultRepository;
use propscout::domain::services::term_deduplicator::SkipReason;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_processed_owner_prunes_business_variants() {
    let pipeline = Pipeline::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("term", "Johnson"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(
            2,
            &[("R-100", "JOHNSON ROBERT"), ("R-101", "JOHNSON MARY")],
        )))
        .expect(1)
        .mount(&pipeline.upstream)
        .await;

    let id = pipeline
        .admission
        .admit(SearchTerm::new("Johnson"), 0)
        .await
        .unwrap();
    let worker = pipeline.worker();
    assert_eq!(pipeline.drain(&worker).await, 1);

    let job = pipeline.job(id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.record_count, Some(2));
    let records = pipeline.results.find_by_job(id).await.unwrap();
    assert_eq!(records[0].external_id, "R-100");
    assert_eq!(records[1].owner_name.as_deref(), Some("JOHNSON MARY"));

    for variant in ["Johnson LLC", "Johnson Trust"] {
        let err = pipeline
            .admission
            .admit(SearchTerm::new(variant), 0)
            .await
            .unwrap_err();
        assert!(
            matches!(err, AdmissionError::Duplicate(SkipReason::BusinessSuperset)),
            "{} was not pruned: {:?}",
            variant,
            err
        );
    }

    assert!(pipeline
        .admission
        .admit(SearchTerm::new("Robert Johnson"), 0)
        .await
        .is_ok());

    let stats = pipeline.admission.stats().await;
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.business_superset, 2);
}

#[tokio::test]
async fn test_higher_priority_terms_are_scraped_first() {
    let pipeline = Pipeline::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(0, &[])))
        .mount(&pipeline.upstream)
        .await;

    let low = pipeline
        .admission
        .admit(SearchTerm::new("Anderson"), 0)
        .await
        .unwrap();
    let high = pipeline
        .admission
        .admit(SearchTerm::new("Baker"), 10)
        .await
        .unwrap();

    let worker = pipeline.worker();
    assert!(worker.process_next_job().await.unwrap());
    assert_eq!(pipeline.job(high).await.status, JobStatus::Completed);
    assert_eq!(pipeline.job(low).await.status, JobStatus::Queued);
}

#[tokio::test]
async fn test_upstream_rejection_becomes_denylist_candidate() {
    let pipeline = Pipeline::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(250_000, &[])))
        .mount(&pipeline.upstream)
        .await;

    let id = pipeline
        .admission
        .admit(SearchTerm::new("Smith"), 0)
        .await
        .unwrap();
    pipeline.drain(&pipeline.worker()).await;

    let job = pipeline.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.failure_reason.unwrap().contains("too broad"));
    assert_eq!(
        pipeline.admission.stats().await.denylist_candidates,
        vec!["smith".to_string()]
    );
}

#[tokio::test]
async fn test_requeue_failed_respects_cooldown() {
    let pipeline = Pipeline::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid term"))
        .mount(&pipeline.upstream)
        .await;

    pipeline
        .admission
        .admit(SearchTerm::new("Martinez"), 0)
        .await
        .unwrap();
    pipeline.drain(&pipeline.worker()).await;

    // admitted moments ago, still inside the cooldown window
    let summary = pipeline.admission.requeue_failed(10).await.unwrap();
    assert_eq!(summary.queued, 0);
    assert_eq!(summary.rejected, 1);
}

#[tokio::test]
async fn test_requeue_failed_enqueues_after_cooldown() {
    let pipeline = Pipeline::with_options(3, Duration::ZERO).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid term"))
        .up_to_n_times(1)
        .mount(&pipeline.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(
            1,
            &[("M-1", "MARTINEZ ANA")],
        )))
        .mount(&pipeline.upstream)
        .await;

    let first = pipeline
        .admission
        .admit(SearchTerm::new("Martinez"), 0)
        .await
        .unwrap();
    let worker = pipeline.worker();
    pipeline.drain(&worker).await;
    assert_eq!(pipeline.job(first).await.status, JobStatus::Failed);

    let summary = pipeline.admission.requeue_failed(10).await.unwrap();
    assert_eq!(summary.queued, 1);
    assert_eq!(pipeline.drain(&worker).await, 1);

    let counts = pipeline.queue_counts().await;
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 1);

    // the term now has a completed job and is no longer reported as failed
    let summary = pipeline.admission.requeue_failed(10).await.unwrap();
    assert_eq!(summary.queued, 0);
}
