// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::credentials::provider::CredentialProvider;
use crate::domain::models::credential::{Credential, CredentialError, CredentialHealth};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type RefreshResult = Result<Arc<Credential>, CredentialError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// 后台刷新计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshSchedule {
    /// 固定周期
    Interval(Duration),
    /// Cron 表达式（含秒字段）
    Cron(String),
}

/// 进行中的刷新
///
/// 只在刷新运行期间存在，所有加入者等待同一个共享 future。
struct InFlight {
    attempt: u64,
    started_at: Instant,
    future: SharedRefresh,
}

#[derive(Default)]
struct RefreshStats {
    last_refresh_at: Option<DateTime<Utc>>,
    refresh_count: u64,
    failure_count: u64,
    last_error: Option<String>,
}

struct BrokerInner {
    provider: Arc<dyn CredentialProvider>,
    refresh_timeout: Duration,
    current: RwLock<Option<Arc<Credential>>>,
    in_flight: Mutex<Option<InFlight>>,
    next_attempt: AtomicU64,
    generation: AtomicU64,
    stats: Mutex<RefreshStats>,
    refreshed: Notify,
    shutdown: CancellationToken,
}

/// 凭证代理
///
/// 持有当前凭证并负责刷新。状态机：
/// `NoCredential → Refreshing → Valid → Refreshing → Valid ...`。
/// 首次刷新失败回到 `NoCredential`，之后的刷新失败保留旧凭证。
///
/// 任意时刻最多只有一个刷新在运行：并发调用者加入同一次刷新。
/// 刷新运行在独立任务上，加入者被丢弃不会取消刷新本身。
#[derive(Clone)]
pub struct CredentialBroker {
    inner: Arc<BrokerInner>,
}

impl CredentialBroker {
    /// 创建新的凭证代理
    ///
    /// # 参数
    ///
    /// * `provider` - 凭证提供者
    /// * `refresh_timeout` - 单次刷新超时
    /// * `shutdown` - 关闭令牌，取消后拒绝新刷新并中止进行中的刷新
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        refresh_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                provider,
                refresh_timeout,
                current: RwLock::new(None),
                in_flight: Mutex::new(None),
                next_attempt: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                stats: Mutex::new(RefreshStats::default()),
                refreshed: Notify::new(),
                shutdown,
            }),
        }
    }

    /// 当前凭证，从不等待刷新
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.inner.current.read().clone()
    }

    /// 立即刷新
    ///
    /// 已有刷新在进行时加入它，否则发起新的刷新。
    pub async fn refresh_now(&self) -> RefreshResult {
        self.join_or_start().await
    }

    /// 在凭证被上游拒绝后刷新
    ///
    /// 若当前凭证比被拒绝的凭证更新（其他工作器已刷新），直接返回当前凭证。
    pub async fn refresh_if_stale(&self, rejected: Option<&Credential>) -> RefreshResult {
        if let (Some(current), Some(rejected)) = (self.current(), rejected) {
            if current.is_newer_than(rejected) {
                debug!(
                    current_generation = current.generation(),
                    rejected_generation = rejected.generation(),
                    "Credential already refreshed by another worker"
                );
                return Ok(current);
            }
        }
        self.refresh_now().await
    }

    fn join_or_start(&self) -> SharedRefresh {
        let mut slot = self.inner.in_flight.lock();

        if let Some(in_flight) = slot.as_ref() {
            debug!(
                attempt = in_flight.attempt,
                elapsed_ms = in_flight.started_at.elapsed().as_millis() as u64,
                "Joining in-flight credential refresh"
            );
            return in_flight.future.clone();
        }

        if self.inner.shutdown.is_cancelled() {
            return futures::future::ready(Err(CredentialError::ShuttingDown))
                .boxed()
                .shared();
        }

        let attempt = self.inner.next_attempt.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = tokio::spawn(self.inner.clone().run_attempt(attempt));
        let future = async move {
            handle.await.unwrap_or_else(|e| {
                Err(CredentialError::Provider(format!(
                    "refresh task aborted: {}",
                    e
                )))
            })
        }
        .boxed()
        .shared();

        // the spawned attempt clears this slot, and it needs the lock we still hold
        *slot = Some(InFlight {
            attempt,
            started_at: Instant::now(),
            future: future.clone(),
        });

        future
    }

    /// 凭证健康状态
    pub fn health(&self) -> CredentialHealth {
        let is_refreshing = self.inner.in_flight.lock().is_some();
        let has_credential = self.inner.current.read().is_some();
        let stats = self.inner.stats.lock();
        CredentialHealth {
            has_credential,
            last_refresh_at: stats.last_refresh_at,
            refresh_count: stats.refresh_count,
            failure_count: stats.failure_count,
            is_refreshing,
            last_error: stats.last_error.clone(),
        }
    }

    /// 关闭代理：中止进行中的刷新并拒绝新刷新
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// 启动后台刷新循环
    ///
    /// 定时刷新与调用方触发的刷新共存：定时触发时若已有刷新在进行则加入它；
    /// 调用方刷新成功后固定周期重新计时。关闭令牌取消后循环退出。
    pub fn spawn_refresh_loop(&self, schedule: RefreshSchedule) -> JoinHandle<()> {
        let broker = self.clone();
        match schedule {
            RefreshSchedule::Interval(period) => {
                tokio::spawn(async move { broker.run_interval_loop(period).await })
            }
            RefreshSchedule::Cron(expression) => tokio::spawn(async move {
                if let Err(e) = broker.run_cron_loop(&expression).await {
                    error!(error = %e, cron = %expression, "Credential refresh scheduler failed");
                }
            }),
        }
    }

    async fn run_interval_loop(&self, period: Duration) {
        info!(period_secs = period.as_secs(), "Credential refresh loop started");
        let shutdown = self.inner.shutdown.clone();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let refreshed = self.inner.refreshed.notified();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_now().await {
                        warn!(error = %e, "Scheduled credential refresh failed");
                    }
                }
                _ = refreshed => {
                    ticker.reset();
                    debug!("Credential refresh schedule reset");
                }
            }
        }

        info!("Credential refresh loop stopped");
    }

    async fn run_cron_loop(&self, expression: &str) -> anyhow::Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        let broker = self.clone();
        let job = Job::new_async(expression, move |_uuid, _lock| {
            let broker = broker.clone();
            Box::pin(async move {
                if let Err(e) = broker.refresh_now().await {
                    warn!(error = %e, "Scheduled credential refresh failed");
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;
        info!(cron = %expression, "Credential refresh scheduler started");

        self.inner.shutdown.cancelled().await;
        scheduler.shutdown().await?;
        info!("Credential refresh scheduler stopped");
        Ok(())
    }
}

impl BrokerInner {
    async fn run_attempt(self: Arc<Self>, attempt: u64) -> RefreshResult {
        let started = Instant::now();
        info!(attempt, provider = self.provider.name(), "Credential refresh started");

        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => Err(CredentialError::ShuttingDown),
            result = tokio::time::timeout(self.refresh_timeout, self.provider.acquire()) => {
                result.unwrap_or(Err(CredentialError::Timeout))
            }
        };

        let result = match outcome {
            Ok(credential) => {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let credential = Arc::new(credential.stamped(generation));
                *self.current.write() = Some(credential.clone());
                {
                    let mut stats = self.stats.lock();
                    stats.refresh_count += 1;
                    stats.last_refresh_at = Some(Utc::now());
                    stats.last_error = None;
                }
                metrics::counter!("credential_refresh_total", "result" => "success").increment(1);
                info!(
                    attempt,
                    generation,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Credential refreshed"
                );
                Ok(credential)
            }
            Err(e) => {
                {
                    let mut stats = self.stats.lock();
                    stats.failure_count += 1;
                    stats.last_error = Some(e.to_string());
                }
                metrics::counter!("credential_refresh_total", "result" => "failure").increment(1);
                warn!(
                    attempt,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Credential refresh failed, keeping previous credential"
                );
                Err(e)
            }
        };

        // state is published before the marker goes away
        {
            let mut slot = self.in_flight.lock();
            if slot.as_ref().is_some_and(|f| f.attempt == attempt) {
                *slot = None;
            }
        }

        if result.is_ok() {
            self.refreshed.notify_waiters();
        }

        result
    }
}
