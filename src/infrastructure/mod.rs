// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 包含系统的技术实现细节，负责与外部系统交互。
///
/// 包含的子模块：
/// - 缓存（cache）：Redis客户端
/// - 数据库（database）：连接池、迁移和实体映射
/// - 指标（metrics）：Prometheus 导出器
/// - 仓库实现（repositories）：领域仓库接口的SeaORM实现
/// - 服务（services）：基于Redis的准入闸门
///
/// 基础设施层依赖于领域层的抽象接口，领域层不感知具体技术实现。
pub mod cache;
pub mod database;
pub mod metrics;
pub mod repositories;
pub mod services;
