//! Error type of the collaborator service and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("invalid lesson data: {0}")]
    Seed(#[from] serde_json::Error),

    #[error("invalid bind address `{0}`")]
    InvalidAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Seed(_) | Self::InvalidAddress(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            _ => "INTERNAL_ERROR",
        }
    }
}

/// Error response body. Clients only rely on the status code and `message`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::NotFound { .. } => "not found".to_string(),
            Self::BadRequest(reason) => reason.clone(),
            other => {
                tracing::error!(error = %other, "Request failed");
                "internal error".to_string()
            }
        };
        let body = ErrorBody {
            code: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
