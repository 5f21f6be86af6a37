// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use axum::Router;
use propscout::application::usecases::admit_term::TermAdmission;
use propscout::config::settings::DatabaseSettings;
use propscout::credentials::broker::CredentialBroker;
use propscout::credentials::provider::CredentialProvider;
use propscout::domain::models::credential::{Credential, CredentialError};
use propscout::domain::models::job::{QueueCounts, ScrapeJob};
use propscout::domain::services::admission_gate::InMemoryAdmissionGate;
use propscout::domain::services::term_deduplicator::TermDeduplicator;
use propscout::engines::upstream_engine::{UpstreamConfig, UpstreamExecutor};
use propscout::infrastructure::database::connection;
use propscout::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use propscout::infrastructure::repositories::property_repo_impl::PropertyRepositoryImpl;
use propscout::presentation::routes::{self, AppState};
use propscout::queue::job_queue::{DurableJobQueue, JobQueue};
use propscout::utils::retry_policy::RetryPolicy;
use propscout::workers::scrape_worker::{ScrapeWorker, WorkerConfig};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::MockServer;

pub type TestQueue = DurableJobQueue<JobRepositoryImpl>;
pub type TestWorker = ScrapeWorker<TestQueue, UpstreamExecutor, PropertyRepositoryImpl>;

/// 依次签发 `token-1`、`token-2` ... 的凭证提供者
#[derive(Default)]
pub struct CountingProvider {
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for CountingProvider {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential::new(format!("token-{}", n)))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// 完整的准入与抓取流水线，上游由 wiremock 模拟
pub struct Pipeline {
    pub db: Arc<DatabaseConnection>,
    pub queue: Arc<TestQueue>,
    pub results: Arc<PropertyRepositoryImpl>,
    pub gate: Arc<InMemoryAdmissionGate>,
    pub admission: Arc<TermAdmission>,
    pub broker: CredentialBroker,
    pub provider: Arc<CountingProvider>,
    pub upstream: MockServer,
    pub shutdown: CancellationToken,
}

impl Pipeline {
    pub async fn start() -> Self {
        Self::with_options(3, Duration::from_secs(300)).await
    }

    pub async fn with_options(max_retries: i32, cooldown: Duration) -> Self {
        let db = Arc::new(
            connection::connect_and_migrate(&DatabaseSettings {
                url: "sqlite::memory:".to_string(),
                max_connections: None,
                min_connections: None,
                connect_timeout: None,
                idle_timeout: None,
            })
            .await
            .expect("failed to set up database"),
        );

        let queue = Arc::new(DurableJobQueue::new(
            Arc::new(JobRepositoryImpl::new(db.clone())),
            chrono::Duration::minutes(5),
        ));
        let gate = Arc::new(InMemoryAdmissionGate::new(cooldown));
        let shutdown = CancellationToken::new();
        let admission = Arc::new(TermAdmission::new(
            TermDeduplicator::default(),
            gate.clone(),
            queue.clone(),
            max_retries,
            shutdown.child_token(),
        ));
        let provider = Arc::new(CountingProvider::default());
        let broker = CredentialBroker::new(
            provider.clone(),
            Duration::from_secs(5),
            shutdown.child_token(),
        );

        Self {
            results: Arc::new(PropertyRepositoryImpl::new(db.clone())),
            db,
            queue,
            gate,
            admission,
            broker,
            provider,
            upstream: MockServer::start().await,
            shutdown,
        }
    }

    /// 退避为零的工作器，重排的任务可立即再次出队
    pub fn worker(&self) -> TestWorker {
        let config = UpstreamConfig {
            base_url: self.upstream.uri(),
            page_size: 50,
            max_pages: 5,
            result_ceiling: 1000,
            requests_per_minute: NonZeroU32::new(6000).expect("non-zero"),
            max_in_flight: 4,
            request_timeout: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(10),
        };

        ScrapeWorker::new(
            self.queue.clone(),
            Arc::new(UpstreamExecutor::new(config).expect("executor")),
            self.results.clone(),
            self.broker.clone(),
            self.admission.clone(),
            WorkerConfig {
                retry_policy: RetryPolicy {
                    initial_backoff: Duration::ZERO,
                    enable_jitter: false,
                    ..RetryPolicy::default()
                },
                exhausted_delay: Duration::ZERO,
                poll_interval: Duration::from_millis(10),
            },
        )
    }

    pub fn app(&self) -> Router {
        routes::app(AppState {
            admission: self.admission.clone(),
            queue: self.queue.clone(),
            broker: self.broker.clone(),
        })
    }

    pub async fn job(&self, id: Uuid) -> ScrapeJob {
        self.queue
            .status(id)
            .await
            .expect("status query")
            .expect("job exists")
    }

    pub async fn queue_counts(&self) -> QueueCounts {
        self.queue.counts().await.expect("counts query")
    }

    /// 处理队列中所有到期任务，返回处理的任务数
    pub async fn drain(&self, worker: &TestWorker) -> usize {
        let mut processed = 0;
        while worker.process_next_job().await.expect("job processing") {
            processed += 1;
        }
        processed
    }
}

/// 上游的一页搜索结果
pub fn search_page(total: u64, owners: &[(&str, &str)]) -> Value {
    let results: Vec<Value> = owners
        .iter()
        .map(|(id, owner)| json!({ "id": id, "owner_name": owner, "address": "100 MAIN ST" }))
        .collect();
    json!({ "total_count": total, "results": results })
}
