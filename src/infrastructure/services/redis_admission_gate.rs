// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::term::SearchTerm;
use crate::domain::services::admission_gate::{AdmissionGate, GateError};
use crate::infrastructure::cache::redis_client::RedisClient;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// 基于Redis的准入闸门
///
/// `SET <key> 1 NX PX <cooldown_ms>` 在一次往返内完成检查并设置，
/// 多个进程共享同一冷却窗口。
pub struct RedisAdmissionGate {
    redis: Arc<RedisClient>,
    cooldown: Duration,
    key_prefix: String,
}

impl RedisAdmissionGate {
    pub fn new(redis: Arc<RedisClient>, cooldown: Duration) -> Self {
        Self {
            redis,
            cooldown,
            key_prefix: "propscout:gate".to_string(),
        }
    }

    fn key(&self, term: &SearchTerm) -> String {
        format!("{}:{}", self.key_prefix, term)
    }
}

#[async_trait]
impl AdmissionGate for RedisAdmissionGate {
    async fn can_schedule(&self, term: &SearchTerm) -> Result<bool, GateError> {
        // PX 0 is rejected by Redis
        let ttl_ms = (self.cooldown.as_millis() as u64).max(1);
        self.redis
            .set_nx_px(&self.key(term), "1", ttl_ms)
            .await
            .map_err(|e| GateError::Backend(e.to_string()))
    }

    async fn release(&self, term: &SearchTerm) -> Result<(), GateError> {
        self.redis
            .delete(&self.key(term))
            .await
            .map_err(|e| GateError::Backend(e.to_string()))
    }
}
