use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

use crate::billing::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("billing store error: {0}")]
    Store(#[from] StoreError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Message(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Store(StoreError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Store(StoreError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Message(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(?self);
        (status, self.to_string()).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
