// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::job_repository::JobRepository;
use crate::queue::job_queue::QueueError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 队列维护任务
///
/// 周期性地把租约已过期的执行中任务放回队列（工作器崩溃后的恢复）。
/// 任务获取由工作器通过 `dequeue` 主动拉取，这里不参与。
pub struct QueueMaintenance<R: JobRepository + 'static> {
    /// 任务仓库
    repository: Arc<R>,
    /// 检查周期
    period: Duration,
}

impl<R: JobRepository + 'static> QueueMaintenance<R> {
    /// 创建新的队列维护任务，默认每分钟检查一次
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            period: Duration::from_secs(60),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// 执行一次维护
    ///
    /// # 返回值
    ///
    /// * `Ok(u64)` - 被放回队列的任务数
    pub async fn run_once(&self) -> Result<u64, QueueError> {
        let count = self.repository.reset_stuck_jobs().await?;
        if count > 0 {
            info!("Reset {} jobs with expired leases", count);
        }
        Ok(count)
    }

    /// 启动后台维护任务，关闭令牌取消后退出
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Queue maintenance stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!("Failed to reset stuck jobs: {}", e);
                        }
                    }
                }
            }
        })
    }
}
