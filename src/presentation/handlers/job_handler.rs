// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::application::dto::job_request::{
    BatchJobRequestDto, JobRequestDto, RetryFailedRequestDto,
};
use crate::application::dto::job_response::{BatchJobResponseDto, JobAcceptedDto, JobStatusDto};
use crate::application::usecases::admit_term::{RequeueSummary, TermAdmission};
use crate::domain::models::term::SearchTerm;
use crate::presentation::errors::AppError;
use crate::queue::job_queue::JobQueue;

/// 提交单个搜索词
///
/// 通过去重和准入闸门后入队，返回 202 和任务ID
pub async fn create_job(
    Extension(admission): Extension<Arc<TermAdmission>>,
    Json(request): Json<JobRequestDto>,
) -> Result<(StatusCode, Json<JobAcceptedDto>), AppError> {
    request.validate()?;

    let term = SearchTerm::new(&request.search_term);
    let id = admission
        .admit(term.clone(), request.priority.unwrap_or(0))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAcceptedDto {
            id,
            search_term: term.into(),
        }),
    ))
}

/// 按顺序提交一批搜索词，逐个返回结果
pub async fn create_batch(
    Extension(admission): Extension<Arc<TermAdmission>>,
    Json(request): Json<BatchJobRequestDto>,
) -> Result<Json<BatchJobResponseDto>, AppError> {
    request.validate()?;

    let terms = request.terms.iter().map(String::as_str).map(SearchTerm::new);
    let results = admission
        .admit_batch(terms, request.priority.unwrap_or(0))
        .await;

    Ok(Json(results.into()))
}

/// 查询任务状态
pub async fn get_job(
    Extension(queue): Extension<Arc<dyn JobQueue>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusDto>, AppError> {
    match queue.status(id).await? {
        Some(job) => Ok(Json(job.into())),
        None => Err(AppError::not_found(format!("job {}", id))),
    }
}

/// 重新提交失败的搜索词
pub async fn retry_failed(
    Extension(admission): Extension<Arc<TermAdmission>>,
    Json(request): Json<RetryFailedRequestDto>,
) -> Result<Json<RequeueSummary>, AppError> {
    request.validate()?;
    let summary = admission.requeue_failed(request.limit()).await?;
    Ok(Json(summary))
}
