use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by the listing service.
///
/// Every variant maps to a machine-readable HTTP status + code pair so the
/// SPA can branch on failures without string matching.
#[derive(Debug, Error)]
pub enum MarketError {
    /// A field failed schema validation or normalization.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// The owner already has the maximum number of active listings.
    #[error("listing quota of {limit} reached")]
    QuotaExceeded { limit: u32 },

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The image codec could not decode the uploaded bytes. Distinct from
    /// generic upload failure so the client can tell the seller to convert
    /// the file.
    #[error("unsupported or undecodable image format")]
    UnsupportedImageFormat,

    #[error("you do not have permission to {0}")]
    Forbidden(&'static str),

    #[error("missing or invalid caller identity")]
    Unauthorized,

    #[error("object storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("image processing error: {0}")]
    Image(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MarketError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP status for this error kind.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedImageFormat => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Storage(_) | Self::Database(_) | Self::Image(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnsupportedImageFormat => "UNSUPPORTED_IMAGE_FORMAT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Image(_) => "IMAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, code = self.code(), "request failed");
        } else {
            warn!(error = %self, code = self.code(), "request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

pub type MarketResult<T> = Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            MarketError::validation("year", "out of range").status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            MarketError::QuotaExceeded { limit: 10 }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            MarketError::NotFound("vehicle").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MarketError::UnsupportedImageFormat.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MarketError::Storage("timeout".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_code_is_stable() {
        assert_eq!(MarketError::UnsupportedImageFormat.code(), "UNSUPPORTED_IMAGE_FORMAT");
        assert_eq!(MarketError::Unauthorized.code(), "UNAUTHORIZED");
    }
}
