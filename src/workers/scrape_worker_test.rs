// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

#[cfg(test)]
mod tests {
    use crate::credentials::broker::CredentialBroker;
    use crate::credentials::provider::CredentialProvider;
    use crate::domain::models::credential::{Credential, CredentialError};
    use crate::domain::models::job::{JobStatus, ScrapeJob};
    use crate::domain::models::property::PropertyRecord;
    use crate::domain::models::term::SearchTerm;
    use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};
    use crate::domain::repositories::result_repository::ResultRepository;
    use crate::domain::services::term_deduplicator::RejectionSink;
    use crate::engines::traits::{ScrapeExecutor, ScrapeOutcome};
    use crate::infrastructure::database::connection::memory_database;
    use crate::infrastructure::database::entities::job_outcome;
    use crate::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
    use crate::infrastructure::repositories::property_repo_impl::PropertyRepositoryImpl;
    use crate::queue::job_queue::{DurableJobQueue, JobQueue, QueueError};
    use crate::utils::retry_policy::RetryPolicy;
    use crate::workers::scrape_worker::{ScrapeWorker, WorkerConfig, CREDENTIAL_REFRESH_FAILED};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sea_orm::{DatabaseConnection, EntityTrait};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    struct ScriptedExecutor {
        script: Mutex<VecDeque<ScrapeOutcome>>,
        tokens: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(outcomes: Vec<ScrapeOutcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(outcomes.into()),
                tokens: Mutex::new(Vec::new()),
            })
        }

        fn tokens(&self) -> Vec<String> {
            self.tokens.lock().clone()
        }
    }

    #[async_trait]
    impl ScrapeExecutor for ScriptedExecutor {
        async fn run(&self, _job: &ScrapeJob, credential: &Credential) -> ScrapeOutcome {
            self.tokens.lock().push(credential.token().to_string());
            let next = self.script.lock().pop_front();
            next.unwrap_or(ScrapeOutcome::Success(vec![]))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
        failures: Mutex<VecDeque<usize>>,
    }

    impl CountingProvider {
        fn new() -> Arc<Self> {
            Self::failing_on(&[])
        }

        /// 第 n 次调用（从 1 开始）返回错误
        fn failing_on(calls: &[usize]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures: Mutex::new(calls.iter().copied().collect()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        async fn acquire(&self) -> Result<Credential, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failures.lock().contains(&n) {
                return Err(CredentialError::Provider("login rejected".to_string()));
            }
            Ok(Credential::new(format!("token-{}", n)))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        terms: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RejectionSink for RecordingSink {
        async fn report_rejection(&self, term: &SearchTerm, _reason: &str) {
            self.terms.lock().push(term.to_string());
        }
    }

    type TestWorker =
        ScrapeWorker<DurableJobQueue<JobRepositoryImpl>, ScriptedExecutor, PropertyRepositoryImpl>;

    struct Harness {
        db: Arc<DatabaseConnection>,
        queue: Arc<DurableJobQueue<JobRepositoryImpl>>,
        results: Arc<PropertyRepositoryImpl>,
        sink: Arc<RecordingSink>,
        broker: CredentialBroker,
    }

    impl Harness {
        async fn new(provider: Arc<CountingProvider>) -> Self {
            Self::with_lease(provider, chrono::Duration::minutes(5)).await
        }

        async fn with_lease(provider: Arc<CountingProvider>, lease: chrono::Duration) -> Self {
            let db = Arc::new(memory_database().await);
            let queue = Arc::new(DurableJobQueue::new(
                Arc::new(JobRepositoryImpl::new(db.clone())),
                lease,
            ));
            Self {
                results: Arc::new(PropertyRepositoryImpl::new(db.clone())),
                db,
                queue,
                sink: Arc::new(RecordingSink::default()),
                broker: CredentialBroker::new(
                    provider,
                    Duration::from_secs(5),
                    CancellationToken::new(),
                ),
            }
        }

        fn worker(&self, executor: Arc<ScriptedExecutor>) -> TestWorker {
            self.worker_with(executor)
        }

        fn worker_with<E: ScrapeExecutor>(
            &self,
            executor: Arc<E>,
        ) -> ScrapeWorker<DurableJobQueue<JobRepositoryImpl>, E, PropertyRepositoryImpl> {
            ScrapeWorker::new(
                self.queue.clone(),
                executor,
                self.results.clone(),
                self.broker.clone(),
                self.sink.clone(),
                WorkerConfig {
                    retry_policy: RetryPolicy::default(),
                    exhausted_delay: Duration::from_secs(5),
                    poll_interval: Duration::from_millis(10),
                },
            )
        }

        async fn enqueue(&self, term: &str, max_retries: i32) -> Uuid {
            self.queue
                .enqueue(ScrapeJob::new(SearchTerm::new(term), 0, max_retries))
                .await
                .unwrap()
                .id
        }

        async fn job(&self, id: Uuid) -> ScrapeJob {
            self.queue.status(id).await.unwrap().unwrap()
        }

        async fn outcomes(&self) -> Vec<job_outcome::Model> {
            job_outcome::Entity::find()
                .all(self.db.as_ref())
                .await
                .unwrap()
        }
    }

    /// 执行期间让租约过期并被另一个工作器取走
    struct ReclaimingExecutor {
        db: Arc<DatabaseConnection>,
        queue: Arc<DurableJobQueue<JobRepositoryImpl>>,
        other_worker: Uuid,
    }

    #[async_trait]
    impl ScrapeExecutor for ReclaimingExecutor {
        async fn run(&self, _job: &ScrapeJob, _credential: &Credential) -> ScrapeOutcome {
            let repo = JobRepositoryImpl::new(self.db.clone());
            assert_eq!(repo.reset_stuck_jobs().await.unwrap(), 1);
            assert!(self.queue.dequeue(self.other_worker).await.unwrap().is_some());
            ScrapeOutcome::PermanentFailure("Upstream returned HTTP 422: bad term".to_string())
        }

        fn name(&self) -> &'static str {
            "reclaiming"
        }
    }

    fn records(ids: &[&str]) -> Vec<PropertyRecord> {
        ids.iter()
            .map(|id| PropertyRecord::from_upstream(json!({"id": id, "owner_name": "JOHNSON ROBERT"})).unwrap())
            .collect()
    }

    fn credential_failure() -> ScrapeOutcome {
        ScrapeOutcome::CredentialFailure("Upstream returned HTTP 401: expired".to_string())
    }

    #[tokio::test]
    async fn test_success_saves_records_and_completes() {
        let harness = Harness::new(CountingProvider::new()).await;
        let id = harness.enqueue("Johnson", 3).await;
        let worker = harness.worker(ScriptedExecutor::new(vec![ScrapeOutcome::Success(
            records(&["P-1", "P-2"]),
        )]));

        assert!(worker.process_next_job().await.unwrap());

        let job = harness.job(id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.record_count, Some(2));
        assert_eq!(harness.results.find_by_job(id).await.unwrap().len(), 2);

        let outcomes = harness.outcomes().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, "completed");
        assert_eq!(outcomes[0].meta["record_count"], 2);
    }

    #[tokio::test]
    async fn test_empty_queue_reports_idle() {
        let harness = Harness::new(CountingProvider::new()).await;
        let worker = harness.worker(ScriptedExecutor::new(vec![]));
        assert!(!worker.process_next_job().await.unwrap());
    }

    #[tokio::test]
    async fn test_credential_failure_refreshes_and_retries_once() {
        let provider = CountingProvider::new();
        let harness = Harness::new(provider.clone()).await;
        let id = harness.enqueue("Johnson", 3).await;
        let executor = ScriptedExecutor::new(vec![
            credential_failure(),
            ScrapeOutcome::Success(records(&["P-1"])),
        ]);
        let worker = harness.worker(executor.clone());

        worker.process_next_job().await.unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(executor.tokens(), vec!["token-1", "token-2"]);
        let job = harness.job(id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempt_count, 2);
        assert_eq!(job.record_count, Some(1));
    }

    #[tokio::test]
    async fn test_repeated_credential_failure_falls_back_to_backoff() {
        let harness = Harness::new(CountingProvider::new()).await;
        let id = harness.enqueue("Johnson", 3).await;
        let executor = ScriptedExecutor::new(vec![credential_failure(), credential_failure()]);
        let worker = harness.worker(executor.clone());

        worker.process_next_job().await.unwrap();

        assert_eq!(executor.tokens().len(), 2);
        let job = harness.job(id).await;
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempt_count, 2);
        assert!(job.scheduled_at.unwrap() > chrono::Utc::now());
        // backoff hides the job from the next poll
        assert!(!worker.process_next_job().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_refresh_is_a_retryable_failure() {
        let harness = Harness::new(CountingProvider::failing_on(&[2])).await;
        let id = harness.enqueue("Johnson", 3).await;
        let executor = ScriptedExecutor::new(vec![credential_failure()]);
        let worker = harness.worker(executor.clone());

        worker.process_next_job().await.unwrap();

        assert_eq!(executor.tokens(), vec!["token-1"]);
        let job = harness.job(id).await;
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempt_count, 1);
        assert!(job
            .failure_reason
            .unwrap()
            .starts_with(CREDENTIAL_REFRESH_FAILED));
        // the first credential is kept after the failed refresh
        assert_eq!(harness.broker.current().unwrap().token(), "token-1");
    }

    #[tokio::test]
    async fn test_missing_credential_requeues_without_running() {
        let harness = Harness::new(CountingProvider::failing_on(&[1])).await;
        let id = harness.enqueue("Johnson", 3).await;
        let executor = ScriptedExecutor::new(vec![]);
        let worker = harness.worker(executor.clone());

        worker.process_next_job().await.unwrap();

        assert!(executor.tokens().is_empty());
        assert_eq!(harness.job(id).await.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_retryable_failure_fails_once_attempts_are_spent() {
        let harness = Harness::new(CountingProvider::new()).await;
        let id = harness.enqueue("Johnson", 1).await;
        let worker = harness.worker(ScriptedExecutor::new(vec![ScrapeOutcome::RetryableFailure(
            "Upstream returned HTTP 503: busy".to_string(),
        )]));

        worker.process_next_job().await.unwrap();

        let job = harness.job(id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.failure_reason.as_deref(),
            Some("Upstream returned HTTP 503: busy")
        );
        assert!(harness.sink.terms.lock().is_empty());

        let outcomes = harness.outcomes().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, "failed");
        assert_eq!(outcomes[0].meta["kind"], "transient_network");
    }

    #[tokio::test]
    async fn test_permanent_failure_reports_rejection() {
        let harness = Harness::new(CountingProvider::new()).await;
        let id = harness.enqueue("Smith", 3).await;
        let worker = harness.worker(ScriptedExecutor::new(vec![ScrapeOutcome::PermanentFailure(
            "Search term too broad: 90000 results exceeds ceiling of 5000".to_string(),
        )]));

        worker.process_next_job().await.unwrap();

        let job = harness.job(id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempt_count, 1);
        assert_eq!(*harness.sink.terms.lock(), vec!["Smith".to_string()]);
    }

    #[tokio::test]
    async fn test_resource_exhaustion_refunds_attempt() {
        let harness = Harness::new(CountingProvider::new()).await;
        let id = harness.enqueue("Johnson", 1).await;
        let worker = harness.worker(ScriptedExecutor::new(vec![
            ScrapeOutcome::ResourceExhausted("Upstream request slots exhausted".to_string()),
        ]));

        worker.process_next_job().await.unwrap();

        let job = harness.job(id).await;
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempt_count, 0);
        assert!(job.scheduled_at.is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let harness = Harness::new(CountingProvider::new()).await;
        let id = harness.enqueue("Johnson", 3).await;
        let worker = harness.worker(ScriptedExecutor::new(vec![]));
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        let handle = tokio::spawn(async move { worker.run(token).await });

        for _ in 0..200 {
            if harness.job(id).await.status == JobStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(harness.job(id).await.status, JobStatus::Completed);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_credential_failure_on_final_attempt_fails_without_retry() {
        let provider = CountingProvider::new();
        let harness = Harness::new(provider.clone()).await;
        let id = harness.enqueue("Johnson", 1).await;
        let executor = ScriptedExecutor::new(vec![
            credential_failure(),
            ScrapeOutcome::Success(records(&["P-1"])),
        ]);
        let worker = harness.worker(executor.clone());

        worker.process_next_job().await.unwrap();

        assert_eq!(executor.tokens(), vec!["token-1"]);
        assert_eq!(provider.calls(), 1);
        let job = harness.job(id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempt_count, 1);
        assert!(job.attempt_count <= job.max_retries);

        let outcomes = harness.outcomes().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].meta["kind"], "credential");
    }

    #[tokio::test]
    async fn test_stale_worker_cannot_finish_reclaimed_job() {
        // dequeued leases are already expired, so maintenance reclaims mid-attempt
        let harness =
            Harness::with_lease(CountingProvider::new(), chrono::Duration::seconds(-1)).await;
        let id = harness.enqueue("Johnson", 3).await;
        let other_worker = Uuid::new_v4();
        let worker = harness.worker_with(Arc::new(ReclaimingExecutor {
            db: harness.db.clone(),
            queue: harness.queue.clone(),
            other_worker,
        }));

        let err = worker.process_next_job().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QueueError>(),
            Some(QueueError::Repository(RepositoryError::LeaseLost(job_id))) if *job_id == id
        ));

        let job = harness.job(id).await;
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.lock_token, Some(other_worker));
        assert!(harness.outcomes().await.is_empty());
        assert!(harness.sink.terms.lock().is_empty());
    }
}
