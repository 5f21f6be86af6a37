// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工具模块
///
/// 重试退避、日志初始化和关闭协调
pub mod retry_policy;
pub mod shutdown;
pub mod telemetry;
