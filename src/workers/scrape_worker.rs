// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::QueueSettings;
use crate::credentials::broker::CredentialBroker;
use crate::domain::models::credential::Credential;
use crate::domain::models::job::{JobStatus, ScrapeJob};
use crate::domain::repositories::result_repository::ResultRepository;
use crate::domain::services::term_deduplicator::RejectionSink;
use crate::engines::traits::{ScrapeExecutor, ScrapeOutcome};
use crate::queue::job_queue::JobQueue;
use crate::utils::retry_policy::RetryPolicy;

/// 凭证刷新失败时记录的失败原因
pub const CREDENTIAL_REFRESH_FAILED: &str = "credential refresh failed";

/// 工作器运行参数
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// 可重试失败的退避策略
    pub retry_policy: RetryPolicy,
    /// 资源耗尽时的固定重排延迟
    pub exhausted_delay: Duration,
    /// 队列为空时的轮询间隔
    pub poll_interval: Duration,
}

impl WorkerConfig {
    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self {
            retry_policy: RetryPolicy::from_settings(settings),
            exhausted_delay: settings.exhausted_delay(),
            poll_interval: settings.poll_interval(),
        }
    }
}

/// 抓取工作器
///
/// 循环出队任务、取凭证、执行抓取并按结果分类处理：
///
/// - 凭证失效：还有尝试余量时刷新凭证（已被其他工作器刷新则直接复用），
///   计入一次尝试后立即重跑一次，重跑结果按常规处理；没有余量时直接标记失败
/// - 可重试失败：未达到最大尝试次数时指数退避重排，否则标记失败
/// - 永久失败：立即标记失败，并把搜索词报告为黑名单候选
/// - 资源耗尽：固定延迟重排，不消耗尝试次数
/// - 成功：保存结果、完成任务、记录结果日志
pub struct ScrapeWorker<Q, E, S>
where
    Q: JobQueue,
    E: ScrapeExecutor,
    S: ResultRepository,
{
    queue: Arc<Q>,
    executor: Arc<E>,
    results: Arc<S>,
    broker: CredentialBroker,
    rejections: Arc<dyn RejectionSink>,
    config: WorkerConfig,
    worker_id: Uuid,
}

impl<Q, E, S> ScrapeWorker<Q, E, S>
where
    Q: JobQueue,
    E: ScrapeExecutor,
    S: ResultRepository,
{
    /// 创建新的抓取工作器实例
    pub fn new(
        queue: Arc<Q>,
        executor: Arc<E>,
        results: Arc<S>,
        broker: CredentialBroker,
        rejections: Arc<dyn RejectionSink>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            executor,
            results,
            broker,
            rejections,
            config,
            worker_id: Uuid::new_v4(),
        }
    }

    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    /// 运行抓取工作器
    ///
    /// 每轮之间检查关闭令牌；正在处理的任务会执行完（受单次尝试超时约束）。
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(worker_id = %self.worker_id, executor = self.executor.name(), "Scrape worker started");

        while !shutdown.is_cancelled() {
            let idle = match self.process_next_job().await {
                Ok(processed) => !processed,
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Error processing job");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!(worker_id = %self.worker_id, "Scrape worker stopped");
    }

    /// 处理下一个任务
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 处理了一个任务
    /// * `Ok(false)` - 队列为空
    pub async fn process_next_job(&self) -> Result<bool> {
        match self.queue.dequeue(self.worker_id).await? {
            Some(job) => {
                self.process_job(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, term = %job.search_term, attempt = job.attempt_count))]
    async fn process_job(&self, mut job: ScrapeJob) -> Result<()> {
        debug!("Processing job");

        let credential = match self.credential().await {
            Ok(credential) => credential,
            Err(reason) => {
                return self
                    .handle_outcome(&job, ScrapeOutcome::RetryableFailure(reason))
                    .await;
            }
        };

        let mut outcome = self.executor.run(&job, &credential).await;

        if let ScrapeOutcome::CredentialFailure(reason) = &outcome {
            if job.can_retry() {
                info!(
                    reason = %reason,
                    generation = credential.generation(),
                    "Credential rejected, refreshing"
                );
                outcome = match self.broker.refresh_if_stale(Some(&credential)).await {
                    Ok(fresh) => {
                        job.attempt_count = self
                            .queue
                            .record_attempt(job.id, self.worker_id)
                            .await?;
                        debug!(
                            attempt = job.attempt_count,
                            generation = fresh.generation(),
                            "Retrying immediately with refreshed credential"
                        );
                        self.executor.run(&job, &fresh).await
                    }
                    Err(e) => {
                        warn!(error = %e, "Credential refresh failed");
                        ScrapeOutcome::RetryableFailure(format!(
                            "{}: {}",
                            CREDENTIAL_REFRESH_FAILED, e
                        ))
                    }
                };
            } else {
                debug!(
                    attempt = job.attempt_count,
                    max_retries = job.max_retries,
                    "Credential rejected on final attempt"
                );
            }
        }

        self.handle_outcome(&job, outcome).await
    }

    async fn credential(&self) -> Result<Arc<Credential>, String> {
        if let Some(credential) = self.broker.current() {
            return Ok(credential);
        }
        self.broker.refresh_now().await.map_err(|e| {
            warn!(error = %e, "No credential available");
            format!("{}: {}", CREDENTIAL_REFRESH_FAILED, e)
        })
    }

    async fn handle_outcome(&self, job: &ScrapeJob, outcome: ScrapeOutcome) -> Result<()> {
        let kind = outcome.kind().map(|k| k.as_str()).unwrap_or("success");

        match outcome {
            ScrapeOutcome::Success(records) => {
                let saved = self.results.save_results(job.id, &records).await?;
                self.queue.complete(job.id, self.worker_id, saved).await?;
                metrics::counter!("jobs_completed_total").increment(1);
                info!(record_count = saved, attempts = job.attempt_count, "Job completed");
                self.record_outcome(
                    job,
                    JobStatus::Completed,
                    json!({ "record_count": saved, "attempts": job.attempt_count }),
                )
                .await;
            }
            ScrapeOutcome::ResourceExhausted(reason) => {
                self.queue
                    .retry_later(
                        job.id,
                        self.worker_id,
                        self.config.exhausted_delay,
                        &reason,
                        true,
                    )
                    .await?;
                metrics::counter!("jobs_retried_total", "kind" => kind).increment(1);
                debug!(reason = %reason, "Resources exhausted, job requeued");
            }
            ScrapeOutcome::PermanentFailure(reason) => {
                self.fail(job, &reason, kind).await?;
                self.rejections
                    .report_rejection(&job.search_term, &reason)
                    .await;
            }
            ScrapeOutcome::RetryableFailure(reason) | ScrapeOutcome::CredentialFailure(reason) => {
                if job.can_retry() {
                    let delay = self
                        .config
                        .retry_policy
                        .calculate_backoff(job.attempt_count.max(1) as u32);
                    self.queue
                        .retry_later(job.id, self.worker_id, delay, &reason, false)
                        .await?;
                    metrics::counter!("jobs_retried_total", "kind" => kind).increment(1);
                    info!(
                        reason = %reason,
                        attempt = job.attempt_count,
                        max_retries = job.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduled retry"
                    );
                } else {
                    self.fail(job, &reason, kind).await?;
                }
            }
        }

        Ok(())
    }

    async fn fail(&self, job: &ScrapeJob, reason: &str, kind: &'static str) -> Result<()> {
        self.queue.fail(job.id, self.worker_id, reason).await?;
        metrics::counter!("jobs_failed_total", "kind" => kind).increment(1);
        warn!(reason, attempts = job.attempt_count, "Job failed");
        self.record_outcome(
            job,
            JobStatus::Failed,
            json!({ "reason": reason, "kind": kind, "attempts": job.attempt_count }),
        )
        .await;
        Ok(())
    }

    async fn record_outcome(&self, job: &ScrapeJob, status: JobStatus, meta: serde_json::Value) {
        // best effort
        if let Err(e) = self.results.record_job_outcome(job.id, status, meta).await {
            warn!(error = %e, "Failed to record job outcome");
        }
    }
}

#[cfg(test)]
#[path = "scrape_worker_test.rs"]
mod tests;
