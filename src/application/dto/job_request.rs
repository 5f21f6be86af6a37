// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 提交搜索词请求
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct JobRequestDto {
    /// 业主姓名或企业名称
    #[validate(length(min = 1, max = 200, message = "Search term must be 1-200 characters"))]
    pub search_term: String,
    /// 优先级，数值越大越先处理
    #[validate(range(min = -100, max = 100))]
    pub priority: Option<i32>,
}

/// 批量提交请求
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct BatchJobRequestDto {
    #[validate(length(min = 1, max = 1000, message = "Batch must contain 1-1000 terms"))]
    pub terms: Vec<String>,
    #[validate(range(min = -100, max = 100))]
    pub priority: Option<i32>,
}

/// 失败任务重新入队请求
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct RetryFailedRequestDto {
    /// 最多重新入队的搜索词数量
    #[validate(range(min = 1, max = 10000))]
    pub limit: Option<u64>,
}

impl RetryFailedRequestDto {
    pub const DEFAULT_LIMIT: u64 = 1000;

    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}
