// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::usecases::admit_term::TermAdmission;
use crate::credentials::broker::CredentialBroker;
use crate::presentation::handlers::{health_handler, job_handler};
use crate::queue::job_queue::JobQueue;
use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 处理器共享的依赖
#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<TermAdmission>,
    pub queue: Arc<dyn JobQueue>,
    pub broker: CredentialBroker,
}

/// 创建应用路由
///
/// # 返回值
///
/// 返回配置好的路由，依赖通过 `Extension` 注入
pub fn routes() -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_handler::health_check))
        .route("/v1/version", get(version));

    let job_routes = Router::new()
        .route("/v1/jobs", post(job_handler::create_job))
        .route("/v1/jobs/batch", post(job_handler::create_batch))
        .route("/v1/jobs/retry-failed", post(job_handler::retry_failed))
        .route("/v1/jobs/{id}", get(job_handler::get_job));

    Router::new().merge(public_routes).merge(job_routes)
}

/// 组装完整应用：路由、依赖注入和请求追踪
pub fn app(state: AppState) -> Router {
    routes()
        .layer(Extension(state.admission))
        .layer(Extension(state.queue))
        .layer(Extension(state.broker))
        .layer(TraceLayer::new_for_http())
}

/// 版本信息端点
///
/// # 返回值
///
/// 返回应用版本号
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
