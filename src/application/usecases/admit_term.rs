// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::ScrapeJob;
use crate::domain::models::term::SearchTerm;
use crate::domain::services::admission_gate::AdmissionGate;
use crate::domain::services::term_deduplicator::{
    DedupStats, RejectionSink, SkipReason, TermDeduplicator,
};
use crate::queue::job_queue::{JobQueue, QueueError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// 准入错误类型
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// 去重规则判定为重复
    #[error("Search term skipped: {0}")]
    Duplicate(SkipReason),
    /// 冷却期内或闸门不可用
    #[error("Search term was admitted too recently")]
    RateLimited,
    /// 正在关闭
    #[error("Service is shutting down")]
    ShuttingDown,
    /// 输入无效
    #[error("Validation error: {0}")]
    Validation(String),
    /// 入队失败
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// 批量准入中单个搜索词的结果
#[derive(Debug)]
pub struct AdmissionResult {
    pub term: SearchTerm,
    pub outcome: Result<Uuid, AdmissionError>,
}

/// 失败搜索词重新入队的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequeueSummary {
    pub queued: u64,
    pub rejected: u64,
}

/// 搜索词准入用例
///
/// 所有候选词的唯一入口：去重 → 准入闸门 → 入队 → 标记已使用。
/// 整个流程在一把异步锁内串行执行，检查与标记之间不会有其他候选插入。
/// 入队成功后才标记已使用；入队失败时同时撤销闸门记录，该词可以立即再次提交。
pub struct TermAdmission {
    dedup: Mutex<TermDeduplicator>,
    gate: Arc<dyn AdmissionGate>,
    queue: Arc<dyn JobQueue>,
    max_retries: i32,
    shutdown: CancellationToken,
}

impl TermAdmission {
    /// 创建新的准入用例
    ///
    /// # 参数
    ///
    /// * `dedup` - 去重器
    /// * `gate` - 准入闸门
    /// * `queue` - 任务队列
    /// * `max_retries` - 新任务的最大尝试次数
    /// * `shutdown` - 关闭令牌，取消后拒绝新的准入
    pub fn new(
        dedup: TermDeduplicator,
        gate: Arc<dyn AdmissionGate>,
        queue: Arc<dyn JobQueue>,
        max_retries: i32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dedup: Mutex::new(dedup),
            gate,
            queue,
            max_retries,
            shutdown,
        }
    }

    /// 准入一个搜索词
    ///
    /// # 返回值
    ///
    /// * `Ok(Uuid)` - 新任务ID
    /// * `Err(AdmissionError)` - 拒绝原因
    pub async fn admit(&self, term: SearchTerm, priority: i32) -> Result<Uuid, AdmissionError> {
        if self.shutdown.is_cancelled() {
            return Err(AdmissionError::ShuttingDown);
        }
        if term.is_empty() {
            return Err(AdmissionError::Validation(
                "search term cannot be empty".to_string(),
            ));
        }

        let mut dedup = self.dedup.lock().await;

        if let Some(reason) = dedup.check(&term) {
            return Err(AdmissionError::Duplicate(reason));
        }

        self.pass_gate(&term).await?;

        let job = match self
            .queue
            .enqueue(ScrapeJob::new(term.clone(), priority, self.max_retries))
            .await
        {
            Ok(job) => job,
            Err(e) => {
                self.release_gate(&term).await;
                return Err(e.into());
            }
        };

        dedup.mark_used(term);
        metrics::counter!("jobs_admitted_total").increment(1);
        info!(job_id = %job.id, term = %job.search_term, priority, "Search term admitted");
        Ok(job.id)
    }

    /// 按顺序准入一批搜索词
    pub async fn admit_batch<I>(&self, terms: I, priority: i32) -> Vec<AdmissionResult>
    where
        I: IntoIterator<Item = SearchTerm>,
    {
        let mut results = Vec::new();
        for term in terms {
            let outcome = self.admit(term.clone(), priority).await;
            results.push(AdmissionResult { term, outcome });
        }
        results
    }

    /// 重新入队失败的搜索词
    ///
    /// 这些词已在已使用集合中，只经过准入闸门，不经过去重规则。
    pub async fn requeue_failed(&self, limit: u64) -> Result<RequeueSummary, AdmissionError> {
        if self.shutdown.is_cancelled() {
            return Err(AdmissionError::ShuttingDown);
        }

        let terms = self.queue.failed_terms(limit).await?;
        let mut summary = RequeueSummary::default();
        let mut dedup = self.dedup.lock().await;

        for raw in terms {
            let term = SearchTerm::from(raw);
            if self.pass_gate(&term).await.is_err() {
                summary.rejected += 1;
                continue;
            }

            let job = match self
                .queue
                .enqueue(ScrapeJob::new(term.clone(), 0, self.max_retries))
                .await
            {
                Ok(job) => job,
                Err(e) => {
                    self.release_gate(&term).await;
                    return Err(e.into());
                }
            };
            dedup.mark_used(term);
            summary.queued += 1;
            info!(job_id = %job.id, term = %job.search_term, "Failed search term requeued");
        }

        Ok(summary)
    }

    /// 用持久化存储中的非失败任务恢复已使用集合
    pub async fn seed_used_terms(&self) -> Result<usize, AdmissionError> {
        let terms = self.queue.known_terms().await?;
        let seeded = self
            .dedup
            .lock()
            .await
            .seed(terms.into_iter().map(SearchTerm::from));
        info!(seeded, "Restored used search terms from queue");
        Ok(seeded)
    }

    /// 去重统计
    pub async fn stats(&self) -> DedupStats {
        self.dedup.lock().await.stats()
    }

    async fn release_gate(&self, term: &SearchTerm) {
        if let Err(e) = self.gate.release(term).await {
            warn!(term = %term, error = %e, "Failed to release admission gate entry");
        }
    }

    async fn pass_gate(&self, term: &SearchTerm) -> Result<(), AdmissionError> {
        match self.gate.can_schedule(term).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AdmissionError::RateLimited),
            Err(e) => {
                warn!(term = %term, error = %e, "Admission gate unavailable, rejecting");
                Err(AdmissionError::RateLimited)
            }
        }
    }
}

#[async_trait]
impl RejectionSink for TermAdmission {
    async fn report_rejection(&self, term: &SearchTerm, reason: &str) {
        warn!(term = %term, reason, "Upstream rejected search term, recorded as denylist candidate");
        self.dedup.lock().await.add_denylist_candidate(term);
    }
}
