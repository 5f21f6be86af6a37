// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::credential::{Credential, CredentialError};
use async_trait::async_trait;
use std::sync::Arc;

/// 凭证提供者特质
///
/// 一次调用完成一次完整的凭证获取。调用方负责超时控制，
/// 实现需保证在 future 被丢弃时释放持有的资源。
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// 获取新凭证
    async fn acquire(&self) -> Result<Credential, CredentialError>;

    /// 提供者名称
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        (**self).acquire().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// 静态凭证提供者
///
/// 直接返回配置中的令牌，用于开发和测试环境
pub struct StaticCredentialProvider {
    token: String,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        if self.token.trim().is_empty() {
            return Err(CredentialError::Configuration(
                "static token is empty".to_string(),
            ));
        }
        Ok(Credential::new(self.token.clone()))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
