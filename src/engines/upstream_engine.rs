// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::{QueueSettings, UpstreamSettings};
use crate::domain::models::credential::Credential;
use crate::domain::models::job::ScrapeJob;
use crate::domain::models::property::PropertyRecord;
use crate::engines::traits::{EngineError, ScrapeExecutor, ScrapeOutcome};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// 上游执行器配置
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// API 根地址
    pub base_url: String,
    pub page_size: u32,
    pub max_pages: u32,
    /// 结果总数上限
    pub result_ceiling: u64,
    pub requests_per_minute: NonZeroU32,
    /// 同时进行的尝试上限
    pub max_in_flight: usize,
    /// 单个HTTP请求超时
    pub request_timeout: Duration,
    /// 单次尝试（含全部分页）超时
    pub attempt_timeout: Duration,
}

impl UpstreamConfig {
    pub fn from_settings(
        upstream: &UpstreamSettings,
        queue: &QueueSettings,
    ) -> Result<Self, EngineError> {
        let requests_per_minute = NonZeroU32::new(upstream.requests_per_minute).ok_or_else(|| {
            EngineError::InvalidRequest("upstream.requests_per_minute must be > 0".to_string())
        })?;
        url::Url::parse(&upstream.base_url)
            .map_err(|e| EngineError::InvalidRequest(format!("upstream.base_url: {}", e)))?;

        Ok(Self {
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            page_size: upstream.page_size.max(1),
            max_pages: upstream.max_pages.max(1),
            result_ceiling: upstream.result_ceiling,
            requests_per_minute,
            max_in_flight: upstream.max_in_flight.max(1),
            request_timeout: Duration::from_secs(upstream.request_timeout_secs),
            attempt_timeout: queue.attempt_timeout(),
        })
    }
}

/// 上游搜索接口的一页结果
#[derive(Debug, Deserialize)]
struct SearchPage {
    total_count: u64,
    #[serde(default)]
    results: Vec<Value>,
}

/// 上游执行器
///
/// 调用 `GET {base_url}/search?term=..&page=..&page_size=..`，带 Bearer 凭证，
/// 逐页拉取直到取满 `total_count` 或达到最大页数。请求经过 `governor`
/// 限速；同时进行的尝试数由信号量限制，槽位已满时立即返回资源耗尽。
pub struct UpstreamExecutor {
    client: reqwest::Client,
    config: UpstreamConfig,
    limiter: Arc<DefaultDirectRateLimiter>,
    slots: Arc<Semaphore>,
}

impl UpstreamExecutor {
    pub fn new(config: UpstreamConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("propscout/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
            config.requests_per_minute,
        )));
        let slots = Arc::new(Semaphore::new(config.max_in_flight));

        Ok(Self {
            client,
            config,
            limiter,
            slots,
        })
    }

    /// 空闲槽位数
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    async fn fetch_all(
        &self,
        term: &str,
        credential: &Credential,
    ) -> Result<Vec<PropertyRecord>, EngineError> {
        let mut records = Vec::new();
        let mut fetched_rows: u64 = 0;

        for page in 1..=self.config.max_pages {
            let batch = self.fetch_page(term, credential, page).await?;

            if batch.total_count > self.config.result_ceiling {
                return Err(EngineError::TooBroad {
                    total: batch.total_count,
                    ceiling: self.config.result_ceiling,
                });
            }

            let rows = batch.results.len() as u64;
            fetched_rows += rows;
            for row in batch.results {
                match PropertyRecord::from_upstream(row) {
                    Some(record) => records.push(record),
                    None => debug!(term, page, "Skipping upstream row without id"),
                }
            }

            if rows == 0 || fetched_rows >= batch.total_count {
                break;
            }
            if page == self.config.max_pages {
                warn!(
                    term,
                    total = batch.total_count,
                    fetched = fetched_rows,
                    "Stopped at page limit before fetching every result"
                );
            }
        }

        Ok(records)
    }

    async fn fetch_page(
        &self,
        term: &str,
        credential: &Credential,
        page: u32,
    ) -> Result<SearchPage, EngineError> {
        self.limiter.until_ready().await;

        let response = self
            .client
            .get(format!("{}/search", self.config.base_url))
            .query(&[
                ("term", term.to_string()),
                ("page", page.to_string()),
                ("page_size", self.config.page_size.to_string()),
            ])
            .bearer_auth(credential.token())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(body.char_indices().nth(200).map_or(body.len(), |(i, _)| i));
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<SearchPage>()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ScrapeExecutor for UpstreamExecutor {
    async fn run(&self, job: &ScrapeJob, credential: &Credential) -> ScrapeOutcome {
        let _permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return EngineError::Saturated.into_outcome(),
        };

        let term = job.search_term.as_str();
        let start = Instant::now();
        let result = tokio::time::timeout(
            self.config.attempt_timeout,
            self.fetch_all(term, credential),
        )
        .await
        .unwrap_or(Err(EngineError::Timeout));

        match result {
            Ok(records) => {
                debug!(
                    job_id = %job.id,
                    term,
                    records = records.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Upstream search finished"
                );
                ScrapeOutcome::Success(records)
            }
            Err(e) => {
                if e.is_retryable() {
                    debug!(job_id = %job.id, term, error = %e, "Upstream attempt failed");
                } else {
                    warn!(job_id = %job.id, term, error = %e, "Upstream rejected search");
                }
                e.into_outcome()
            }
        }
    }

    fn name(&self) -> &'static str {
        "upstream"
    }
}

#[cfg(test)]
#[path = "upstream_engine_test.rs"]
mod tests;
