//! Cross-cutting error kinds shared by the store, services, and both HTTP
//! control planes.
//!
//! `OttoError` is the single error type that crosses every repository and
//! service boundary (see §7 of the design). Lower-level errors (`rusqlite`,
//! `r2d2`) are folded into [`OttoError::Internal`] at the repository façade
//! so callers never have to match on a database-specific error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// One structured validation failure, surfaced in `details[]` on
/// `invalid_request` responses.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OttoError {
    #[error("{0}")]
    InvalidRequest(String, Vec<ErrorDetail>),

    #[error("{0}")]
    MissingChat(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    ForbiddenMutation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    StateConflict(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("no handler registered for job type")]
    HandlerNotFound,

    #[error("lease expired")]
    LeaseExpired,
}

impl OttoError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into(), Vec::new())
    }

    pub fn invalid_with_details(message: impl Into<String>, details: Vec<ErrorDetail>) -> Self {
        Self::InvalidRequest(message.into(), details)
    }

    pub fn missing_chat(message: impl Into<String>) -> Self {
        Self::MissingChat(message.into())
    }

    /// The stable error kind string used on the wire (`{"error": "<kind>", ...}`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(..) => "invalid_request",
            Self::MissingChat(_) => "missing_chat",
            Self::Unauthorized => "unauthorized",
            Self::ForbiddenMutation(_) => "forbidden_mutation",
            Self::NotFound(_) => "not_found",
            Self::StateConflict(_) => "state_conflict",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal_error",
            Self::HandlerNotFound => "handler_not_found",
            Self::LeaseExpired => "lease_expired",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(..) => StatusCode::BAD_REQUEST,
            Self::MissingChat(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ForbiddenMutation(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StateConflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Never reach the control planes directly — surfaced only inside
            // a JobRun — but give them a sane mapping for completeness.
            Self::HandlerNotFound => StatusCode::INTERNAL_SERVER_ERROR,
            Self::LeaseExpired => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [ErrorDetail]>,
}

impl IntoResponse for OttoError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        let details = match &self {
            Self::InvalidRequest(_, d) if !d.is_empty() => Some(d.as_slice()),
            _ => None,
        };
        let body = ErrorBody {
            error: kind,
            message: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for OttoError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal(format!("sqlite error: {e}"))
    }
}

impl From<r2d2::Error> for OttoError {
    fn from(e: r2d2::Error) -> Self {
        Self::Internal(format!("connection pool error: {e}"))
    }
}

pub type OttoResult<T> = Result<T, OttoError>;
