// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：抓取任务、搜索词、凭证和房产记录
/// - 仓库接口（repositories）：任务与结果持久化的抽象接口
/// - 服务（services）：搜索词去重和准入节流
///
/// 领域层不依赖于任何外部实现。
pub mod models;
pub mod repositories;
pub mod services;
