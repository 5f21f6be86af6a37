// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::credentials::broker::CredentialBroker;
use crate::domain::repositories::result_repository::ResultRepository;
use crate::domain::services::term_deduplicator::RejectionSink;
use crate::engines::traits::ScrapeExecutor;
use crate::queue::job_queue::JobQueue;
use crate::workers::scrape_worker::{ScrapeWorker, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 工作管理器
///
/// 启动固定数量的抓取工作器，关闭时在宽限期内等待它们退出，超时后中止。
pub struct WorkerManager<Q, E, S>
where
    Q: JobQueue + 'static,
    E: ScrapeExecutor + 'static,
    S: ResultRepository + 'static,
{
    queue: Arc<Q>,
    executor: Arc<E>,
    results: Arc<S>,
    broker: CredentialBroker,
    rejections: Arc<dyn RejectionSink>,
    config: WorkerConfig,
    handles: Vec<JoinHandle<()>>,
}

impl<Q, E, S> WorkerManager<Q, E, S>
where
    Q: JobQueue + 'static,
    E: ScrapeExecutor + 'static,
    S: ResultRepository + 'static,
{
    pub fn new(
        queue: Arc<Q>,
        executor: Arc<E>,
        results: Arc<S>,
        broker: CredentialBroker,
        rejections: Arc<dyn RejectionSink>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            executor,
            results,
            broker,
            rejections,
            config,
            handles: Vec::new(),
        }
    }

    /// 启动工作进程
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的工作进程数量
    /// * `shutdown` - 关闭令牌，取消后各工作器在当前任务结束后退出
    pub fn start_workers(&mut self, count: usize, shutdown: CancellationToken) {
        for _ in 0..count {
            let worker = ScrapeWorker::new(
                self.queue.clone(),
                self.executor.clone(),
                self.results.clone(),
                self.broker.clone(),
                self.rejections.clone(),
                self.config.clone(),
            );
            let token = shutdown.clone();
            self.handles.push(tokio::spawn(async move {
                worker.run(token).await;
            }));
        }
        info!(count, total = self.handles.len(), "Scrape workers started");
    }

    /// 运行中的工作器数量
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// 等待工作器退出
    ///
    /// 关闭令牌应已取消。宽限期结束仍未退出的工作器被中止，丢弃其持有的资源。
    ///
    /// # 返回值
    ///
    /// 被中止的工作器数量
    pub async fn shutdown(&mut self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        let mut aborted = 0;

        for mut handle in self.handles.drain(..) {
            if timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            warn!(aborted, grace_secs = grace.as_secs(), "Aborted workers after grace period");
        } else {
            info!("Workers shut down successfully");
        }
        aborted
    }
}
