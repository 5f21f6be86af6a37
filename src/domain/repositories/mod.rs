// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 包含的仓库接口：
/// - 任务仓库（job_repository）：抓取任务的持久化、出队和租约管理
/// - 结果仓库（result_repository）：房产记录与任务结果日志
pub mod job_repository;
pub mod result_repository;
