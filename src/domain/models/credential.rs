// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// 上游访问凭证
///
/// 不透明的 Bearer 令牌。`generation` 由凭证代理在每次成功刷新时递增盖章，
/// 用于判断某个凭证是否比另一个更新。
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    issued_at: DateTime<Utc>,
    generation: u64,
}

impl Credential {
    /// 创建新凭证，签发时间为当前时间
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Utc::now(),
            generation: 0,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 盖上刷新代数
    pub fn stamped(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// 是否比另一个凭证签发得更晚
    pub fn is_newer_than(&self, other: &Credential) -> bool {
        self.generation > other.generation
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("generation", &self.generation)
            .finish()
    }
}

/// 凭证健康状态
#[derive(Debug, Clone, Default, Serialize)]
pub struct CredentialHealth {
    /// 当前是否持有凭证
    pub has_credential: bool,
    /// 最近一次成功刷新的时间
    pub last_refresh_at: Option<DateTime<Utc>>,
    /// 成功刷新次数
    pub refresh_count: u64,
    /// 失败刷新次数
    pub failure_count: u64,
    /// 是否有刷新正在进行
    pub is_refreshing: bool,
    /// 最近一次刷新失败原因
    pub last_error: Option<String>,
}

/// 凭证错误类型
///
/// 需要在共享的刷新结果之间克隆，因此只携带字符串。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// 凭证提供者失败
    #[error("Credential provider error: {0}")]
    Provider(String),

    /// 浏览器自动化失败
    #[error("Browser error: {0}")]
    Browser(String),

    /// 刷新超时
    #[error("Credential refresh timed out")]
    Timeout,

    /// 系统正在关闭
    #[error("Credential broker is shutting down")]
    ShuttingDown,

    /// 配置缺失或无效
    #[error("Credential configuration error: {0}")]
    Configuration(String),
}
