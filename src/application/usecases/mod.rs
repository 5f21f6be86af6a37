// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用用例模块
///
/// 搜索词准入：去重、准入闸门和入队的唯一入口
pub mod admit_term;
