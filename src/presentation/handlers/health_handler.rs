// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::extract::{Extension, Json};
use std::sync::Arc;

use crate::application::dto::job_response::HealthResponseDto;
use crate::application::usecases::admit_term::TermAdmission;
use crate::credentials::broker::CredentialBroker;
use crate::presentation::errors::AppError;
use crate::queue::job_queue::JobQueue;

/// 健康检查端点
///
/// 汇总凭证状态、队列计数和去重统计。没有可用凭证时状态为 `degraded`。
pub async fn health_check(
    Extension(broker): Extension<CredentialBroker>,
    Extension(queue): Extension<Arc<dyn JobQueue>>,
    Extension(admission): Extension<Arc<TermAdmission>>,
) -> Result<Json<HealthResponseDto>, AppError> {
    let credential = broker.health();
    let status = if credential.has_credential {
        "ok"
    } else {
        "degraded"
    };

    Ok(Json(HealthResponseDto {
        status,
        credential,
        queue: queue.counts().await?,
        dedup: admission.stats().await,
    }))
}
