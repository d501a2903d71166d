//! Error type of the HTTP layer and its mapping to responses.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use py_core::{AppError, AuthError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid form: {0}")]
    Form(String),
    #[error("template rendering failed: {0}")]
    Render(#[from] askama::Error),
}

impl ApiError {
    /// Plain-language text for the notice banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::App(err) => err.user_message(),
            ApiError::Auth(err) => err.code.user_message().to_string(),
            ApiError::Form(message) => message.clone(),
            ApiError::Render(_) => "Ocurrió un error inesperado".to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::App(AppError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            ApiError::App(AppError::EmailNotVerified | AppError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            ApiError::App(AppError::NotFound(..)) => StatusCode::NOT_FOUND,
            ApiError::App(AppError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::App(AppError::QuotaExceeded(_)) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::App(AppError::ValidationFailed(_) | AppError::ModerationRejected(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::App(AppError::RemoteReadFailed(_) | AppError::RemoteWriteFailed(_)) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Form(_) => StatusCode::BAD_REQUEST,
            ApiError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(self.user_message())
    }
}
