// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 搜索词准入用例和API数据传输对象
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 凭证模块
///
/// 上游访问凭证的获取、缓存与刷新
pub mod credentials;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 引擎模块
///
/// 对上游房产检索接口执行单次抓取尝试
pub mod engines;

/// 基础设施模块
///
/// 提供外部服务集成，如数据库、Redis和指标导出
pub mod infrastructure;

/// 表示层模块
///
/// 处理HTTP请求和响应，包括路由和处理器
pub mod presentation;

/// 队列模块
///
/// 持久化任务队列和队列维护
pub mod queue;

/// 工具模块
///
/// 重试策略、日志初始化和关闭协调
pub mod utils;

/// 工作器模块
///
/// 实现后台任务处理和工作器管理
pub mod workers;
