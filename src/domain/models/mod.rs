// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 凭证模型
pub mod credential;
/// 抓取任务模型
pub mod job;
/// 房产记录模型
pub mod property;
/// 搜索词模型
pub mod term;
