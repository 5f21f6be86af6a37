// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use propscout::application::usecases::admit_term::TermAdmission;
use propscout::config::settings::Settings;
use propscout::credentials::broker::{CredentialBroker, RefreshSchedule};
use propscout::credentials::browser_provider::{BrowserCredentialProvider, BrowserLoginConfig};
use propscout::credentials::provider::{CredentialProvider, StaticCredentialProvider};
use propscout::domain::services::admission_gate::{AdmissionGate, InMemoryAdmissionGate};
use propscout::domain::services::term_deduplicator::{DedupConfig, TermDeduplicator};
use propscout::engines::upstream_engine::{UpstreamConfig, UpstreamExecutor};
use propscout::infrastructure::cache::redis_client::RedisClient;
use propscout::infrastructure::database::connection;
use propscout::infrastructure::metrics;
use propscout::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use propscout::infrastructure::repositories::property_repo_impl::PropertyRepositoryImpl;
use propscout::infrastructure::services::redis_admission_gate::RedisAdmissionGate;
use propscout::presentation::routes::{self, AppState};
use propscout::queue::job_queue::DurableJobQueue;
use propscout::queue::scheduler::QueueMaintenance;
use propscout::utils::shutdown::ShutdownCoordinator;
use propscout::utils::telemetry;
use propscout::workers::manager::WorkerManager;
use propscout::workers::scrape_worker::WorkerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting propscout...");

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    if let Some(addr) = &settings.metrics.listen_addr {
        metrics::init_metrics(addr)?;
        info!(addr = %addr, "Prometheus exporter listening");
    }

    let shutdown = ShutdownCoordinator::new();
    shutdown.install();

    // 3. Connect to database and run migrations
    let db = Arc::new(connection::connect_and_migrate(&settings.database).await?);
    info!("Database connection established");

    let job_repo = Arc::new(JobRepositoryImpl::new(db.clone()));
    let queue = Arc::new(DurableJobQueue::new(job_repo.clone(), settings.queue.lease()));
    let results = Arc::new(PropertyRepositoryImpl::new(db.clone()));

    // 4. Admission gate
    let cooldown = Duration::from_secs(settings.rate_limiting.cooldown_secs);
    let gate: Arc<dyn AdmissionGate> = match &settings.redis.url {
        Some(url) => {
            let redis = RedisClient::new(url).await?;
            redis.ping().await?;
            info!("Using Redis admission gate");
            Arc::new(RedisAdmissionGate::new(Arc::new(redis), cooldown))
        }
        None => {
            info!("Using in-process admission gate");
            Arc::new(InMemoryAdmissionGate::new(cooldown))
        }
    };

    // 5. Credentials
    let provider: Arc<dyn CredentialProvider> = match settings
        .credentials
        .static_token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
    {
        Some(token) => Arc::new(StaticCredentialProvider::new(token)),
        None => Arc::new(BrowserCredentialProvider::new(
            BrowserLoginConfig::from_settings(&settings.credentials)?,
        )),
    };
    info!(provider = provider.name(), "Credential provider selected");

    let broker = CredentialBroker::new(
        provider,
        Duration::from_secs(settings.credentials.refresh_timeout_secs),
        shutdown.child_token(),
    );
    let schedule = match &settings.credentials.refresh_cron {
        Some(expression) => RefreshSchedule::Cron(expression.clone()),
        None => RefreshSchedule::Interval(Duration::from_secs(
            settings.credentials.refresh_interval_secs,
        )),
    };
    let refresh_loop = broker.spawn_refresh_loop(schedule);
    if let Err(e) = broker.refresh_now().await {
        warn!(error = %e, "Initial credential refresh failed, workers will retry");
    }

    // 6. Admission funnel
    let dedup = TermDeduplicator::new(DedupConfig::new(
        settings.dedup.min_term_length,
        &settings.dedup.denylist,
    ));
    let admission = Arc::new(TermAdmission::new(
        dedup,
        gate,
        queue.clone(),
        settings.queue.max_retries,
        shutdown.child_token(),
    ));
    admission.seed_used_terms().await?;

    // 7. Start workers
    let executor = Arc::new(UpstreamExecutor::new(UpstreamConfig::from_settings(
        &settings.upstream,
        &settings.queue,
    )?)?);
    let mut worker_manager = WorkerManager::new(
        queue.clone(),
        executor,
        results,
        broker.clone(),
        admission.clone(),
        WorkerConfig::from_settings(&settings.queue),
    );
    worker_manager.start_workers(settings.queue.worker_concurrency, shutdown.child_token());

    let maintenance = QueueMaintenance::new(job_repo).start(shutdown.child_token());

    // 8. Start HTTP server
    let app = routes::app(AppState {
        admission,
        queue,
        broker: broker.clone(),
    });
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let token = shutdown.token();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await;

    // 9. Drain
    shutdown.trigger();
    info!("HTTP server stopped, draining workers");
    let aborted = worker_manager
        .shutdown(Duration::from_secs(settings.shutdown.grace_period_secs))
        .await;
    broker.shutdown();
    let _ = tokio::join!(maintenance, refresh_loop);
    info!(aborted, "propscout stopped");

    served?;
    Ok(())
}
