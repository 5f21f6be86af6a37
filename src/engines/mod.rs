// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 抓取执行器模块
///
/// - traits：执行器特质、尝试结果和错误分类
/// - upstream_engine：基于reqwest的上游搜索API执行器
pub mod traits;
pub mod upstream_engine;
