//! API error taxonomy with stable status-code mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::sandbox::SandboxError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("path escapes the share root")]
    PathEscape,
    #[error("path escapes the share link scope")]
    ScopeEscape,
    #[error("CSRF token missing or mismatched")]
    CsrfMismatch,
    #[error("account locked, retry in {0} seconds")]
    AccountLocked(i64),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("cannot disable or remove the last active admin")]
    LastAdminProtection,
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("share link expired or revoked")]
    LinkGone,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PathEscape | Self::ScopeEscape | Self::LastAdminProtection | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::CsrfMismatch | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::AccountLocked(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::LinkGone => StatusCode::GONE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internals are logged, never echoed back to the client.
        let message = if let Self::Internal(error) = &self {
            error!("internal error: {error:#}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Self::NotFound,
            StoreError::LinkGone => Self::LinkGone,
            StoreError::LastAdminProtection => Self::LastAdminProtection,
            StoreError::Database(error) => Self::Internal(error.into()),
        }
    }
}

impl From<SandboxError> for ApiError {
    fn from(error: SandboxError) -> Self {
        match error {
            SandboxError::InvalidPath | SandboxError::PathEscape => Self::PathEscape,
            SandboxError::Io(error) => match error.kind() {
                std::io::ErrorKind::NotFound => Self::NotFound,
                _ => Self::Internal(error.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_stable() {
        assert_eq!(ApiError::PathEscape.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::ScopeEscape.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::CsrfMismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::AccountLocked(60).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::LinkGone.status(), StatusCode::GONE);
        assert_eq!(
            ApiError::LastAdminProtection.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn sandbox_errors_map_to_bad_request() {
        let error: ApiError = SandboxError::PathEscape.into();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_files_map_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: ApiError = SandboxError::Io(io).into();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }
}
