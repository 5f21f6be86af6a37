// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 关闭协调器
///
/// 进程内唯一订阅 Ctrl-C 和 SIGTERM 的地方。收到信号后取消根令牌，
/// 各组件持有子令牌，随根令牌一起被取消。
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    installed: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根令牌
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 子令牌，根令牌取消时一并取消
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 订阅操作系统信号
    ///
    /// 只有第一次调用会订阅，之后的调用返回 `None`
    pub fn install(&self) -> Option<JoinHandle<()>> {
        if self.installed.swap(true, Ordering::SeqCst) {
            warn!("Shutdown signal handler already installed");
            return None;
        }

        let token = self.token.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => {
                    info!("Shutdown signal received");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        }))
    }

    /// 主动触发关闭
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待关闭开始
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = wait_for_ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!("Unable to listen for SIGTERM: {}", e);
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}
