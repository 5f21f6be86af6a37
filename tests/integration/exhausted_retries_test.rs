// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::Pipeline;
use propscout::domain::models::job::JobStatus;
use propscout::domain::models::term::SearchTerm;
use propscout::infrastructure::database::entities::job_outcome;
use propscout::queue::job_queue::JobQueue;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_exhausted_retries_fail_exactly_once() {
    let pipeline = Pipeline::with_options(2, Duration::from_secs(300)).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(2)
        .mount(&pipeline.upstream)
        .await;

    let id = pipeline
        .admission
        .admit(SearchTerm::new("Thompson"), 0)
        .await
        .unwrap();
    let worker = pipeline.worker();
    assert_eq!(pipeline.drain(&worker).await, 2);

    let job = pipeline.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempt_count, 2);
    assert!(job.failure_reason.unwrap().contains("503"));

    let outcomes = job_outcome::Entity::find()
        .filter(job_outcome::Column::JobId.eq(id))
        .all(pipeline.db.as_ref())
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, "failed");

    // terminal jobs accept no further transitions, even from their last holder
    let holder = worker.worker_id();
    assert!(pipeline.queue.fail(id, holder, "again").await.is_err());
    assert!(pipeline
        .queue
        .retry_later(id, holder, Duration::ZERO, "again", false)
        .await
        .is_err());
    assert!(pipeline.queue.complete(id, holder, 1).await.is_err());
    assert_eq!(pipeline.job(id).await.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_failed_terms_are_listed_for_requeue() {
    let pipeline = Pipeline::with_options(1, Duration::from_secs(300)).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&pipeline.upstream)
        .await;

    for term in ["Thompson", "White"] {
        pipeline
            .admission
            .admit(SearchTerm::new(term), 0)
            .await
            .unwrap();
    }
    pipeline.drain(&pipeline.worker()).await;

    let mut failed = pipeline.queue.failed_terms(10).await.unwrap();
    failed.sort();
    assert_eq!(failed, vec!["Thompson".to_string(), "White".to_string()]);
    assert_eq!(pipeline.queue.failed_terms(1).await.unwrap().len(), 1);
}
