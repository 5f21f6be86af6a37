// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 持久化任务队列和队列维护
pub mod job_queue;
pub mod scheduler;
