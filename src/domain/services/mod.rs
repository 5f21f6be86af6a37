// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 准入闸门（admission_gate）：同一搜索词在冷却窗口内只允许调度一次
/// - 搜索词去重（term_deduplicator）：在入队前剪除冗余搜索词
pub mod admission_gate;
pub mod term_deduplicator;
