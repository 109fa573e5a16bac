//! Mapping of pipeline errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use acadbot_core::Error;

/// Handler error: a pipeline error rendered as JSON.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidRequest(_) | Error::Config(_) | Error::Load { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::IndexMismatch { .. } | Error::DuplicateContent(_) => StatusCode::CONFLICT,
            Error::IndexNotBuilt => StatusCode::SERVICE_UNAVAILABLE,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Embedding { .. } | Error::Generation { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self.0);
        }

        let body = match self.0.provider_failure() {
            Some(kind) => json!({
                "status": "unable_to_answer",
                "error": self.0.to_string(),
                "kind": kind,
                "retryable": kind.is_transient(),
            }),
            None => json!({ "error": self.0.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use acadbot_core::ProviderFailure;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError(Error::IndexNotBuilt).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError(Error::IndexMismatch {
                expected: "a".into(),
                found: "b".into()
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(Error::generation(ProviderFailure::RateLimited, "429")).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(Error::InvalidRequest("empty".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
