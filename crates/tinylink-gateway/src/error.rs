use axum::http::header::InvalidHeaderValue;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tinylink_core::StorageError;
use tinylink_shortener::{DeletionError, ShortenerError};
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Shortener(#[from] ShortenerError),
    #[error("unauthorized requests forbidden")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("failed to sign identity token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Shortener(err) => match err {
                ShortenerError::Conflict(_) => StatusCode::CONFLICT,
                ShortenerError::NotFound(_) => StatusCode::NOT_FOUND,
                ShortenerError::Gone(_) => StatusCode::GONE,
                ShortenerError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
                ShortenerError::Deletion(DeletionError::ShuttingDown) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ShortenerError::Storage(StorageError::Unavailable(_) | StorageError::Timeout(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ShortenerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Token(_) | AppError::Header(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
