// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{QueueCounts, ScrapeJob};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 任务已处于终态，拒绝迁移
    #[error("Job {0} is already in a terminal state")]
    InvalidTransition(Uuid),
    /// 租约已不属于调用方（过期回收后被其他工作器取走）
    #[error("Job {0} is no longer leased to this worker")]
    LeaseLost(Uuid),
}

/// 任务仓库特质
///
/// 定义抓取任务数据访问接口。出队之后的状态更新都以
/// `status = active AND lock_token = worker_id` 为条件：终态任务不会被改写，
/// 租约被回收的工作器也不能再改写别人正在处理的任务。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 创建新任务
    async fn create(&self, job: &ScrapeJob) -> Result<ScrapeJob, RepositoryError>;
    /// 根据ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeJob>, RepositoryError>;
    /// 获取下一个待处理任务并加租约
    async fn acquire_next(
        &self,
        worker_id: Uuid,
        lease: chrono::Duration,
    ) -> Result<Option<ScrapeJob>, RepositoryError>;
    /// 为执行中的任务追加一次尝试计数并续租，返回新的计数
    async fn record_attempt(
        &self,
        id: Uuid,
        worker_id: Uuid,
        lease_expires_at: DateTime<FixedOffset>,
    ) -> Result<i32, RepositoryError>;
    /// 标记任务已完成
    async fn mark_completed(
        &self,
        id: Uuid,
        worker_id: Uuid,
        record_count: i64,
    ) -> Result<(), RepositoryError>;
    /// 重新排期任务
    async fn reschedule(
        &self,
        id: Uuid,
        worker_id: Uuid,
        scheduled_at: DateTime<FixedOffset>,
        reason: &str,
        refund_attempt: bool,
    ) -> Result<(), RepositoryError>;
    /// 标记任务已失败
    async fn mark_failed(
        &self,
        id: Uuid,
        worker_id: Uuid,
        reason: &str,
    ) -> Result<(), RepositoryError>;
    /// 按状态统计任务数
    async fn count_by_status(&self) -> Result<QueueCounts, RepositoryError>;
    /// 失败且没有后续非失败任务的搜索词
    async fn failed_terms(&self, limit: u64) -> Result<Vec<String>, RepositoryError>;
    /// 所有非失败任务的搜索词（用于重启后恢复去重状态）
    async fn known_terms(&self) -> Result<Vec<String>, RepositoryError>;
    /// 重置租约已过期的执行中任务
    async fn reset_stuck_jobs(&self) -> Result<u64, RepositoryError>;
}
