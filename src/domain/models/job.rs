// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::term::SearchTerm;

/// 抓取任务实体
///
/// 表示针对一个搜索词的上游抓取工作单元。任务具有状态、
/// 优先级、重试计数和租约锁定等属性。终态（Completed/Failed）不可再迁出。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJob {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 搜索词
    pub search_term: SearchTerm,
    /// 任务状态
    pub status: JobStatus,
    /// 任务优先级，数值越大优先级越高
    pub priority: i32,
    /// 已尝试次数
    pub attempt_count: i32,
    /// 最大尝试次数
    pub max_retries: i32,
    /// 计划执行时间，退避期间不可被出队
    pub scheduled_at: Option<DateTime<FixedOffset>>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 开始执行时间
    pub started_at: Option<DateTime<FixedOffset>>,
    /// 完成时间
    pub completed_at: Option<DateTime<FixedOffset>>,
    /// 抓取到的记录数
    pub record_count: Option<i64>,
    /// 失败原因
    pub failure_reason: Option<String>,
    /// 锁定令牌（持有租约的工作器ID）
    pub lock_token: Option<Uuid>,
    /// 租约过期时间
    pub lock_expires_at: Option<DateTime<FixedOffset>>,
    /// 更新时间
    pub updated_at: DateTime<FixedOffset>,
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Queued → Active → Completed/Failed，或 Active → Queued（重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已入队
    #[default]
    Queued,
    /// 执行中
    Active,
    /// 已完成
    Completed,
    /// 已失败
    Failed,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Active => write!(f, "active"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "active" => Ok(JobStatus::Active),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 队列计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub queued: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: JobStatus, to: JobStatus },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ScrapeJob {
    /// 创建一个新的抓取任务
    ///
    /// # 参数
    ///
    /// * `search_term` - 搜索词
    /// * `priority` - 优先级
    /// * `max_retries` - 最大尝试次数
    pub fn new(search_term: SearchTerm, priority: i32, max_retries: i32) -> Self {
        let now: DateTime<FixedOffset> = Utc::now().into();
        Self {
            id: Uuid::new_v4(),
            search_term,
            status: JobStatus::Queued,
            priority,
            attempt_count: 0,
            max_retries,
            scheduled_at: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            record_count: None,
            failure_reason: None,
            lock_token: None,
            lock_expires_at: None,
            updated_at: now,
        }
    }

    fn transition(&self, to: JobStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.status,
            to,
        }
    }

    /// 启动任务
    ///
    /// 将任务状态从Queued变更为Active，并计入一次尝试
    pub fn start(mut self, worker_id: Uuid, lease: chrono::Duration) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Queued => {
                let now = Utc::now();
                self.status = JobStatus::Active;
                self.started_at = Some(now.into());
                self.attempt_count += 1;
                self.lock_token = Some(worker_id);
                self.lock_expires_at = Some((now + lease).into());
                self.updated_at = now.into();
                Ok(self)
            }
            _ => Err(self.transition(JobStatus::Active)),
        }
    }

    /// 完成任务
    pub fn complete(mut self, record_count: i64) -> Result<Self, DomainError> {
        if self.status.is_terminal() {
            return Err(self.transition(JobStatus::Completed));
        }
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.record_count = Some(record_count);
        self.completed_at = Some(now.into());
        self.lock_token = None;
        self.lock_expires_at = None;
        self.updated_at = now.into();
        Ok(self)
    }

    /// 标记任务失败
    pub fn fail(mut self, reason: impl Into<String>) -> Result<Self, DomainError> {
        if self.status.is_terminal() {
            return Err(self.transition(JobStatus::Failed));
        }
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(now.into());
        self.lock_token = None;
        self.lock_expires_at = None;
        self.updated_at = now.into();
        Ok(self)
    }

    /// 重新入队等待重试
    ///
    /// `refund_attempt` 为 true 时本次尝试不计入次数（资源耗尽场景）
    pub fn requeue(
        mut self,
        delay: chrono::Duration,
        reason: impl Into<String>,
        refund_attempt: bool,
    ) -> Result<Self, DomainError> {
        if self.status.is_terminal() {
            return Err(self.transition(JobStatus::Queued));
        }
        let now = Utc::now();
        self.status = JobStatus::Queued;
        self.scheduled_at = Some((now + delay).into());
        self.failure_reason = Some(reason.into());
        if refund_attempt {
            self.attempt_count = (self.attempt_count - 1).max(0);
        }
        self.started_at = None;
        self.lock_token = None;
        self.lock_expires_at = None;
        self.updated_at = now.into();
        Ok(self)
    }

    /// 判断任务是否还可以重试
    ///
    /// # 返回值
    ///
    /// 未达到最大尝试次数时返回true
    pub fn can_retry(&self) -> bool {
        !self.status.is_terminal() && self.attempt_count < self.max_retries
    }
}
