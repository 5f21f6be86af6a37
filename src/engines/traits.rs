// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::credential::Credential;
use crate::domain::models::job::ScrapeJob;
use crate::domain::models::property::PropertyRecord;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// 抓取失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeErrorKind {
    /// 请求本身无效，重试无意义
    Validation,
    /// 凭证被上游拒绝
    Credential,
    /// 网络抖动、超时、上游 5xx/429
    TransientNetwork,
    /// 本地并发槽位耗尽
    ResourceExhaustion,
    /// 上游拒绝该搜索词（400/422 或结果过多）
    UpstreamRejection,
}

impl ScrapeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeErrorKind::Validation => "validation",
            ScrapeErrorKind::Credential => "credential",
            ScrapeErrorKind::TransientNetwork => "transient_network",
            ScrapeErrorKind::ResourceExhaustion => "resource_exhaustion",
            ScrapeErrorKind::UpstreamRejection => "upstream_rejection",
        }
    }
}

/// 单次抓取尝试的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    /// 成功，携带全部记录
    Success(Vec<PropertyRecord>),
    /// 可重试的失败
    RetryableFailure(String),
    /// 凭证失效
    CredentialFailure(String),
    /// 永久失败
    PermanentFailure(String),
    /// 资源耗尽，稍后重排且不计入尝试次数
    ResourceExhausted(String),
}

impl ScrapeOutcome {
    /// 失败分类，成功时为 `None`
    pub fn kind(&self) -> Option<ScrapeErrorKind> {
        match self {
            ScrapeOutcome::Success(_) => None,
            ScrapeOutcome::RetryableFailure(_) => Some(ScrapeErrorKind::TransientNetwork),
            ScrapeOutcome::CredentialFailure(_) => Some(ScrapeErrorKind::Credential),
            ScrapeOutcome::PermanentFailure(_) => Some(ScrapeErrorKind::UpstreamRejection),
            ScrapeOutcome::ResourceExhausted(_) => Some(ScrapeErrorKind::ResourceExhaustion),
        }
    }

    /// 失败原因
    pub fn reason(&self) -> Option<&str> {
        match self {
            ScrapeOutcome::Success(_) => None,
            ScrapeOutcome::RetryableFailure(r)
            | ScrapeOutcome::CredentialFailure(r)
            | ScrapeOutcome::PermanentFailure(r)
            | ScrapeOutcome::ResourceExhausted(r) => Some(r),
        }
    }
}

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 上游返回非成功状态码
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// 结果总数超过上限
    #[error("Search term too broad: {total} results exceeds ceiling of {ceiling}")]
    TooBroad { total: u64, ceiling: u64 },
    /// 响应格式无法解析
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
    /// 单次尝试超时
    #[error("Attempt timed out")]
    Timeout,
    /// 并发槽位已满
    #[error("Upstream request slots exhausted")]
    Saturated,
    /// 请求无法构造
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl EngineError {
    /// 错误分类
    pub fn kind(&self) -> ScrapeErrorKind {
        match self {
            EngineError::RequestFailed(e) => {
                if e.is_builder() {
                    ScrapeErrorKind::Validation
                } else if let Some(status) = e.status() {
                    classify_status(status.as_u16())
                } else {
                    ScrapeErrorKind::TransientNetwork
                }
            }
            EngineError::Status { status, .. } => classify_status(*status),
            EngineError::TooBroad { .. } => ScrapeErrorKind::UpstreamRejection,
            EngineError::InvalidResponse(_) | EngineError::Timeout => {
                ScrapeErrorKind::TransientNetwork
            }
            EngineError::Saturated => ScrapeErrorKind::ResourceExhaustion,
            EngineError::InvalidRequest(_) => ScrapeErrorKind::Validation,
        }
    }

    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ScrapeErrorKind::TransientNetwork
                | ScrapeErrorKind::Credential
                | ScrapeErrorKind::ResourceExhaustion
        )
    }

    /// 转换为尝试结果
    pub fn into_outcome(self) -> ScrapeOutcome {
        let reason = self.to_string();
        match self.kind() {
            ScrapeErrorKind::Credential => ScrapeOutcome::CredentialFailure(reason),
            ScrapeErrorKind::TransientNetwork => ScrapeOutcome::RetryableFailure(reason),
            ScrapeErrorKind::ResourceExhaustion => ScrapeOutcome::ResourceExhausted(reason),
            ScrapeErrorKind::Validation | ScrapeErrorKind::UpstreamRejection => {
                ScrapeOutcome::PermanentFailure(reason)
            }
        }
    }
}

/// HTTP 状态码分类
///
/// 401/403 为凭证失效；408、429 和 5xx 可重试；其余 4xx 视为上游拒绝
pub fn classify_status(status: u16) -> ScrapeErrorKind {
    match status {
        401 | 403 => ScrapeErrorKind::Credential,
        408 | 429 => ScrapeErrorKind::TransientNetwork,
        500..=599 => ScrapeErrorKind::TransientNetwork,
        _ => ScrapeErrorKind::UpstreamRejection,
    }
}

/// 抓取执行器特质
///
/// 每次调用执行一次尝试，不做重试。重试策略由工作器决定。
#[async_trait]
pub trait ScrapeExecutor: Send + Sync {
    /// 使用给定凭证执行一次抓取
    async fn run(&self, job: &ScrapeJob, credential: &Credential) -> ScrapeOutcome;

    /// 执行器名称
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: ScrapeExecutor + ?Sized> ScrapeExecutor for Arc<T> {
    async fn run(&self, job: &ScrapeJob, credential: &Credential) -> ScrapeOutcome {
        (**self).run(job, credential).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
