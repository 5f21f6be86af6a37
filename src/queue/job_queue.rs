// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{QueueCounts, ScrapeJob};
use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// 队列错误类型
///
/// 队列为空不是错误，`dequeue` 返回 `Ok(None)`
#[derive(Error, Debug)]
pub enum QueueError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// 任务队列特质
///
/// 持久化的优先级队列：优先级高者先出，同优先级先入先出，
/// 退避中的任务（`scheduled_at` 在未来）不会出队。
///
/// 出队后的操作都带上出队时的 `worker_id`；租约被回收并交给其他工作器后，
/// 原工作器的更新返回 `RepositoryError::LeaseLost`。
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 入队任务
    async fn enqueue(&self, job: ScrapeJob) -> Result<ScrapeJob, QueueError>;

    /// 出队任务，原子地标记为执行中并加租约
    async fn dequeue(&self, worker_id: Uuid) -> Result<Option<ScrapeJob>, QueueError>;

    /// 为执行中的任务追加一次尝试并续租，返回新的尝试次数
    async fn record_attempt(&self, job_id: Uuid, worker_id: Uuid) -> Result<i32, QueueError>;

    /// 完成任务
    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        record_count: u64,
    ) -> Result<(), QueueError>;

    /// 延迟后重试
    ///
    /// `refund_attempt` 为 true 时本次尝试不计入次数
    async fn retry_later(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        delay: Duration,
        reason: &str,
        refund_attempt: bool,
    ) -> Result<(), QueueError>;

    /// 失败任务
    async fn fail(&self, job_id: Uuid, worker_id: Uuid, reason: &str) -> Result<(), QueueError>;

    /// 查询任务
    async fn status(&self, job_id: Uuid) -> Result<Option<ScrapeJob>, QueueError>;

    /// 各状态任务数
    async fn counts(&self) -> Result<QueueCounts, QueueError>;

    /// 失败且未被重新入队的搜索词
    async fn failed_terms(&self, limit: u64) -> Result<Vec<String>, QueueError>;

    /// 所有非失败任务的搜索词
    async fn known_terms(&self) -> Result<Vec<String>, QueueError>;
}

/// 持久化任务队列实现
///
/// 包装任务仓库，Postgres 和 SQLite 均可
pub struct DurableJobQueue<R: JobRepository> {
    /// 任务仓库
    repository: Arc<R>,
    /// 出队租约时长
    lease: chrono::Duration,
}

impl<R: JobRepository> DurableJobQueue<R> {
    /// 创建新的任务队列实例
    ///
    /// # 参数
    ///
    /// * `repository` - 任务仓库
    /// * `lease` - 出队租约，过期后由队列维护任务回收
    pub fn new(repository: Arc<R>, lease: chrono::Duration) -> Self {
        Self { repository, lease }
    }
}

#[async_trait]
impl<R: JobRepository> JobQueue for DurableJobQueue<R> {
    async fn enqueue(&self, job: ScrapeJob) -> Result<ScrapeJob, QueueError> {
        let created = self.repository.create(&job).await?;
        debug!(job_id = %created.id, term = %created.search_term, priority = created.priority, "Job enqueued");
        Ok(created)
    }

    async fn dequeue(&self, worker_id: Uuid) -> Result<Option<ScrapeJob>, QueueError> {
        Ok(self.repository.acquire_next(worker_id, self.lease).await?)
    }

    async fn record_attempt(&self, job_id: Uuid, worker_id: Uuid) -> Result<i32, QueueError> {
        let lease_expires_at = Utc::now() + self.lease;
        Ok(self
            .repository
            .record_attempt(job_id, worker_id, lease_expires_at.into())
            .await?)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        record_count: u64,
    ) -> Result<(), QueueError> {
        let record_count = i64::try_from(record_count).unwrap_or(i64::MAX);
        self.repository
            .mark_completed(job_id, worker_id, record_count)
            .await?;
        Ok(())
    }

    async fn retry_later(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        delay: Duration,
        reason: &str,
        refund_attempt: bool,
    ) -> Result<(), QueueError> {
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(1));
        let scheduled_at = Utc::now() + delay;
        self.repository
            .reschedule(job_id, worker_id, scheduled_at.into(), reason, refund_attempt)
            .await?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, worker_id: Uuid, reason: &str) -> Result<(), QueueError> {
        self.repository.mark_failed(job_id, worker_id, reason).await?;
        Ok(())
    }

    async fn status(&self, job_id: Uuid) -> Result<Option<ScrapeJob>, QueueError> {
        Ok(self.repository.find_by_id(job_id).await?)
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        Ok(self.repository.count_by_status().await?)
    }

    async fn failed_terms(&self, limit: u64) -> Result<Vec<String>, QueueError> {
        Ok(self.repository.failed_terms(limit).await?)
    }

    async fn known_terms(&self) -> Result<Vec<String>, QueueError> {
        Ok(self.repository.known_terms().await?)
    }
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn enqueue(&self, job: ScrapeJob) -> Result<ScrapeJob, QueueError> {
        (**self).enqueue(job).await
    }

    async fn dequeue(&self, worker_id: Uuid) -> Result<Option<ScrapeJob>, QueueError> {
        (**self).dequeue(worker_id).await
    }

    async fn record_attempt(&self, job_id: Uuid, worker_id: Uuid) -> Result<i32, QueueError> {
        (**self).record_attempt(job_id, worker_id).await
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        record_count: u64,
    ) -> Result<(), QueueError> {
        (**self).complete(job_id, worker_id, record_count).await
    }

    async fn retry_later(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        delay: Duration,
        reason: &str,
        refund_attempt: bool,
    ) -> Result<(), QueueError> {
        (**self)
            .retry_later(job_id, worker_id, delay, reason, refund_attempt)
            .await
    }

    async fn fail(&self, job_id: Uuid, worker_id: Uuid, reason: &str) -> Result<(), QueueError> {
        (**self).fail(job_id, worker_id, reason).await
    }

    async fn status(&self, job_id: Uuid) -> Result<Option<ScrapeJob>, QueueError> {
        (**self).status(job_id).await
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        (**self).counts().await
    }

    async fn failed_terms(&self, limit: u64) -> Result<Vec<String>, QueueError> {
        (**self).failed_terms(limit).await
    }

    async fn known_terms(&self) -> Result<Vec<String>, QueueError> {
        (**self).known_terms().await
    }
}
