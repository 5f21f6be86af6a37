// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{search_page, Pipeline};
use propscout::application::usecases::admit_term::AdmissionError;
use propscout::credentials::broker::RefreshSchedule;
use propscout::domain::models::credential::CredentialError;
use propscout::domain::models::job::JobStatus;
use propscout::domain::models::term::SearchTerm;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_shutdown_stops_workers_admission_and_refresh() {
    let pipeline = Pipeline::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(0, &[])))
        .mount(&pipeline.upstream)
        .await;

    let id = pipeline
        .admission
        .admit(SearchTerm::new("Johnson"), 0)
        .await
        .unwrap();

    let worker = pipeline.worker();
    let token = pipeline.shutdown.child_token();
    let worker_task = tokio::spawn(async move { worker.run(token).await });
    let refresh_loop = pipeline
        .broker
        .spawn_refresh_loop(RefreshSchedule::Interval(Duration::from_secs(3600)));

    for _ in 0..200 {
        if pipeline.job(id).await.status == JobStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pipeline.job(id).await.status, JobStatus::Completed);

    pipeline.shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(2), worker_task)
        .await
        .expect("worker did not stop")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), refresh_loop)
        .await
        .expect("refresh loop did not stop")
        .unwrap();

    assert!(matches!(
        pipeline.admission.admit(SearchTerm::new("Robert Johnson"), 0).await,
        Err(AdmissionError::ShuttingDown)
    ));
    assert_eq!(
        pipeline.broker.refresh_now().await.unwrap_err(),
        CredentialError::ShuttingDown
    );
}
