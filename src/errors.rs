use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::storage::StoreError;

/// One rejected field of a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("validation failed")]
    ValidationFailed(Vec<FieldError>),

    #[error("unable to login")]
    AuthenticationFailed,

    #[error("invalid token")]
    InvalidToken,

    #[error("token revoked")]
    TokenRevoked,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid update fields: {}", .0.join(", "))]
    InvalidUpdateFields(Vec<String>),

    #[error("cascade delete failed: {0}")]
    CascadeDeleteFailed(String),

    #[error("upload rejected: {0}")]
    UploadRejected(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AccountError {
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::ValidationFailed(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::ValidationFailed(_)
            | AccountError::AuthenticationFailed
            | AccountError::InvalidUpdateFields(_)
            | AccountError::UploadRejected(_) => StatusCode::BAD_REQUEST,
            AccountError::InvalidToken | AccountError::TokenRevoked | AccountError::UserNotFound => {
                StatusCode::UNAUTHORIZED
            }
            AccountError::NotFound => StatusCode::NOT_FOUND,
            AccountError::CascadeDeleteFailed(_) | AccountError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AccountError::invalid_field("email", "is already registered"),
            StoreError::NotFound => AccountError::UserNotFound,
            StoreError::Backend(e) => AccountError::Internal(e),
        }
    }
}

/// Unreadable or mistyped JSON bodies answer like any other rejected field.
impl From<JsonRejection> for AccountError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "request body rejected");
        AccountError::invalid_field("body", "must be a JSON object with fields of the expected types")
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AccountError::ValidationFailed(fields) => {
                json!({ "error": "Validation failed", "fields": fields })
            }
            AccountError::AuthenticationFailed => json!({ "error": "Unable to login" }),
            AccountError::InvalidToken | AccountError::TokenRevoked | AccountError::UserNotFound => {
                json!({ "error": "Please authenticate." })
            }
            AccountError::InvalidUpdateFields(fields) => {
                json!({ "error": "Invalid updates!", "fields": fields })
            }
            AccountError::UploadRejected(reason) => json!({ "error": reason }),
            AccountError::NotFound => json!({ "error": "Not found" }),
            AccountError::CascadeDeleteFailed(detail) => {
                error!(%detail, "cascade delete failed");
                json!({ "error": "Internal server error" })
            }
            AccountError::Internal(e) => {
                error!(error = %e, "internal error");
                json!({ "error": "Internal server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_share_one_generic_response() {
        for err in [
            AccountError::InvalidToken,
            AccountError::TokenRevoked,
            AccountError::UserNotFound,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn duplicate_email_becomes_validation_failure() {
        let err = AccountError::from(StoreError::DuplicateEmail);
        match err {
            AccountError::ValidationFailed(fields) => assert_eq!(fields[0].field, "email"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cascade_failure_is_a_server_error() {
        let err = AccountError::CascadeDeleteFailed("tasks unavailable".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("tasks unavailable"));
    }
}
