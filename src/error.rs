use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::mail::MailError;
use crate::repo::RepoError;
use crate::storage::StorageError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] Validation(String),
    #[error("{0}")] Unauthorized(String),
    #[error("{0}")] Forbidden(String),
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Conflict(String),
    #[error("too many requests")] TooManyRequests,
    #[error("payload too large")] PayloadTooLarge,
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self { ApiError::Validation(msg.into()) }
    pub fn forbidden(msg: impl Into<String>) -> Self { ApiError::Forbidden(msg.into()) }
    pub fn not_found(msg: impl Into<String>) -> Self { ApiError::NotFound(msg.into()) }
    pub fn conflict(msg: impl Into<String>) -> Self { ApiError::Conflict(msg.into()) }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound("not found".into()),
            RepoError::Conflict => ApiError::Conflict("conflict".into()),
            RepoError::Validation(msg) => ApiError::Validation(msg),
            RepoError::Forbidden(msg) => ApiError::Forbidden(msg),
            RepoError::Internal(msg) => {
                tracing::error!(error = %msg, "repository failure");
                ApiError::Internal
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => ApiError::NotFound("File not found in storage".into()),
            StorageError::Other(msg) => {
                tracing::error!(error = %msg, "object storage failure");
                ApiError::Internal
            }
        }
    }
}

impl From<MailError> for ApiError {
    fn from(e: MailError) -> Self {
        tracing::error!(error = %e, "mail delivery failure");
        ApiError::Internal
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody { message: self.to_string() })
    }
}

/// Map a repository `NotFound` to a specific message, pass everything else through.
pub fn not_found_as(msg: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => ApiError::NotFound(msg.into()),
        other => other.into(),
    }
}
