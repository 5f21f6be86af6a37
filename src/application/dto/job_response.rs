// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::usecases::admit_term::{AdmissionError, AdmissionResult};
use crate::domain::models::credential::CredentialHealth;
use crate::domain::models::job::{QueueCounts, ScrapeJob};
use crate::domain::services::term_deduplicator::DedupStats;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 搜索词已受理响应
#[derive(Debug, Deserialize, Serialize)]
pub struct JobAcceptedDto {
    pub id: Uuid,
    pub search_term: String,
}

/// 任务状态快照
#[derive(Debug, Deserialize, Serialize)]
pub struct JobStatusDto {
    pub id: Uuid,
    pub search_term: String,
    pub status: String,
    pub priority: i32,
    pub attempt_count: i32,
    pub max_retries: i32,
    pub record_count: Option<i64>,
    pub failure_reason: Option<String>,
    pub scheduled_at: Option<DateTime<FixedOffset>>,
    pub started_at: Option<DateTime<FixedOffset>>,
    pub completed_at: Option<DateTime<FixedOffset>>,
    pub created_at: DateTime<FixedOffset>,
}

impl From<ScrapeJob> for JobStatusDto {
    fn from(job: ScrapeJob) -> Self {
        Self {
            id: job.id,
            search_term: job.search_term.into(),
            status: job.status.to_string(),
            priority: job.priority,
            attempt_count: job.attempt_count,
            max_retries: job.max_retries,
            record_count: job.record_count,
            failure_reason: job.failure_reason,
            scheduled_at: job.scheduled_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
        }
    }
}

/// 批量提交中单个搜索词的结果
#[derive(Debug, Deserialize, Serialize)]
pub struct BatchItemDto {
    pub search_term: String,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// 拒绝原因：`too_short`、`already_used`、`rate_limited` 等
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<AdmissionResult> for BatchItemDto {
    fn from(result: AdmissionResult) -> Self {
        let search_term = result.term.into();
        match result.outcome {
            Ok(id) => Self {
                search_term,
                accepted: true,
                id: Some(id),
                reason: None,
            },
            Err(e) => Self {
                search_term,
                accepted: false,
                id: None,
                reason: Some(rejection_code(&e)),
            },
        }
    }
}

/// 批量提交响应
#[derive(Debug, Deserialize, Serialize)]
pub struct BatchJobResponseDto {
    pub accepted: usize,
    pub rejected: usize,
    pub results: Vec<BatchItemDto>,
}

impl From<Vec<AdmissionResult>> for BatchJobResponseDto {
    fn from(results: Vec<AdmissionResult>) -> Self {
        let results: Vec<BatchItemDto> = results.into_iter().map(Into::into).collect();
        let accepted = results.iter().filter(|r| r.accepted).count();
        Self {
            accepted,
            rejected: results.len() - accepted,
            results,
        }
    }
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponseDto {
    pub status: &'static str,
    pub credential: CredentialHealth,
    pub queue: QueueCounts,
    pub dedup: DedupStats,
}

/// 准入错误的机器可读代码
pub fn rejection_code(error: &AdmissionError) -> String {
    match error {
        AdmissionError::Duplicate(reason) => reason.as_str().to_string(),
        AdmissionError::RateLimited => "rate_limited".to_string(),
        AdmissionError::ShuttingDown => "shutting_down".to_string(),
        AdmissionError::Validation(_) => "validation".to_string(),
        AdmissionError::Queue(_) => "queue_error".to_string(),
    }
}
