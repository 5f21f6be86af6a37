// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::term::SearchTerm;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// 每隔多少次调用清理一次过期条目
const PRUNE_EVERY: u64 = 256;

/// 准入闸门错误
#[derive(Error, Debug)]
pub enum GateError {
    /// 后端存储错误
    #[error("Admission gate backend error: {0}")]
    Backend(String),
}

/// 准入闸门特质
///
/// 同一搜索词在冷却窗口内最多准入一次。
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// 检查并记录准入
    ///
    /// 检查与记录是一个原子步骤：并发调用同一搜索词时最多一个返回 `true`。
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 准入，已记录本次准入时间
    /// * `Ok(false)` - 冷却期内，拒绝
    /// * `Err(GateError)` - 后端故障
    async fn can_schedule(&self, term: &SearchTerm) -> Result<bool, GateError>;

    /// 撤销本进程刚记录的准入
    ///
    /// 准入之后入队失败时调用，让该词不必等完整个冷却窗口。
    async fn release(&self, term: &SearchTerm) -> Result<(), GateError>;
}

#[async_trait]
impl<T: AdmissionGate + ?Sized> AdmissionGate for Arc<T> {
    async fn can_schedule(&self, term: &SearchTerm) -> Result<bool, GateError> {
        (**self).can_schedule(term).await
    }

    async fn release(&self, term: &SearchTerm) -> Result<(), GateError> {
        (**self).release(term).await
    }
}

/// 进程内准入闸门
///
/// 基于 `DashMap` 的条目API实现原子的检查并设置。
pub struct InMemoryAdmissionGate {
    cooldown: Duration,
    admissions: DashMap<String, Instant>,
    calls: AtomicU64,
}

impl InMemoryAdmissionGate {
    /// 创建新的进程内准入闸门
    ///
    /// # 参数
    ///
    /// * `cooldown` - 冷却窗口
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            admissions: DashMap::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// 当前跟踪的搜索词数量
    pub fn tracked(&self) -> usize {
        self.admissions.len()
    }

    fn prune(&self, now: Instant) {
        let cooldown = self.cooldown;
        self.admissions
            .retain(|_, admitted_at| now.duration_since(*admitted_at) < cooldown);
    }
}

#[async_trait]
impl AdmissionGate for InMemoryAdmissionGate {
    async fn can_schedule(&self, term: &SearchTerm) -> Result<bool, GateError> {
        let now = Instant::now();

        let admitted = match self.admissions.entry(term.as_str().to_owned()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) >= self.cooldown {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        };

        // entry guard is released above; retain would deadlock on the same shard
        if self.calls.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune(now);
        }

        Ok(admitted)
    }

    async fn release(&self, term: &SearchTerm) -> Result<(), GateError> {
        self.admissions.remove(term.as_str());
        Ok(())
    }
}
