// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// 启动 Prometheus 导出器并注册指标说明
///
/// # 参数
///
/// * `listen_addr` - 导出器监听地址，例如 `0.0.0.0:9000`
pub fn init_metrics(listen_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid metrics address '{}'", listen_addr))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus recorder")?;

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

fn describe_metrics() {
    describe_counter!("jobs_admitted_total", "Search terms admitted to the queue");
    describe_counter!("jobs_completed_total", "Scrape jobs completed");
    describe_counter!("jobs_failed_total", "Scrape jobs failed permanently");
    describe_counter!(
        "jobs_retried_total",
        "Scrape job attempts rescheduled, labelled by failure kind"
    );
    describe_counter!(
        "credential_refresh_total",
        "Credential refresh attempts, labelled by result"
    );
    describe_counter!(
        "dedup_skipped_total",
        "Candidate terms skipped by the deduplicator, labelled by reason"
    );
}
