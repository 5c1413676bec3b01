// Error types for the exchange server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::models::{ErrorBody, MALFORMED_FORM_ERROR, MISSING_FIELD_ERROR, UPSTREAM_FAILURE_ERROR};

/// Failures of a single exchange request
#[derive(Error, Debug)]
pub enum AppError {
    #[error("missing form field: {0}")]
    MissingField(&'static str),

    #[error("malformed multipart body: {0}")]
    MalformedForm(String),

    // Detail is for the log only, never the response body
    #[error("upstream model call failed: {0:#}")]
    UpstreamFailure(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingField(_) | AppError::MalformedForm(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text the caller gets to see.
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::MissingField(_) => MISSING_FIELD_ERROR,
            AppError::MalformedForm(_) => MALFORMED_FORM_ERROR,
            AppError::UpstreamFailure(_) => UPSTREAM_FAILURE_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Fatal problems found while reading configuration at startup
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not defined in environment variables.")]
    MissingVariable(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_detail_stays_out_of_public_message() {
        let err = AppError::from(anyhow::anyhow!("quota exceeded for key abc123"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Failed to process the request");
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn client_errors_map_to_400() {
        assert_eq!(AppError::MissingField("image").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::MalformedForm("eof".into()).public_message(),
            "Invalid multipart form data"
        );
    }
}
