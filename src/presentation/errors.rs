// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::application::dto::job_response::rejection_code;
use crate::application::usecases::admit_term::AdmissionError;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::queue::job_queue::QueueError;

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    /// 资源不存在
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self(anyhow::Error::new(RepositoryError::NotFound).context(format!("{} not found", what)))
    }

    fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<AdmissionError>() {
            return match err {
                AdmissionError::Duplicate(_) => StatusCode::CONFLICT,
                AdmissionError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                AdmissionError::Validation(_) => StatusCode::BAD_REQUEST,
                AdmissionError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                AdmissionError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }

        if self.0.downcast_ref::<validator::ValidationErrors>().is_some() {
            return StatusCode::BAD_REQUEST;
        }

        let repository = self.0.downcast_ref::<RepositoryError>().or_else(|| {
            self.0
                .downcast_ref::<QueueError>()
                .map(|QueueError::Repository(e)| e)
        });
        match repository {
            Some(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            Some(RepositoryError::InvalidTransition(_) | RepositoryError::LeaseLost(_)) => {
                StatusCode::CONFLICT
            }
            Some(RepositoryError::Database(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = format!("{:#}", self.0);
        if status.is_server_error() {
            error!(error = %error_message, "Request failed");
        }

        let body = match self.0.downcast_ref::<AdmissionError>() {
            Some(err) => json!({ "error": error_message, "reason": rejection_code(err) }),
            None => json!({ "error": error_message }),
        };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
