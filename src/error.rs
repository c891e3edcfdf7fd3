//! Unified application error model and mapping helpers.
//! This module provides the classified outcome enum returned by the Powtoon
//! service, along with the mapping to HTTP status codes used by the server.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiError {
    /// Malformed request payload, e.g. unknown user ids in a share request.
    Validation { code: String, message: String },
    /// No authenticated principal.
    Auth { code: String, message: String },
    /// The record is known to exist for this principal, but the operation is denied.
    Forbidden { code: String, message: String },
    /// Absent record, or present but invisible to the principal. The two are
    /// deliberately indistinguishable so ids cannot be probed.
    NotFound { code: String, message: String },
    Internal { code: String, message: String },
}

impl ApiError {
    pub fn code_str(&self) -> &str {
        match self {
            ApiError::Validation { code, .. }
            | ApiError::Auth { code, .. }
            | ApiError::Forbidden { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation { message, .. }
            | ApiError::Auth { message, .. }
            | ApiError::Forbidden { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Validation { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { ApiError::NotFound { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            ApiError::Validation { .. } => 400,
            ApiError::Auth { .. } => 401,
            ApiError::Forbidden { .. } => 403,
            ApiError::NotFound { .. } => 404,
            ApiError::Internal { .. } => 500,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: store/IO faults are internal unless classified upstream
        ApiError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(ApiError::validation("bad_input", "oops").http_status(), 400);
        assert_eq!(ApiError::auth("unauthorized", "no session").http_status(), 401);
        assert_eq!(ApiError::forbidden("forbidden", "not yours").http_status(), 403);
        assert_eq!(ApiError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(ApiError::internal("internal_error", "panic").http_status(), 500);
    }

    #[test]
    fn display_includes_code_and_message() {
        let e = ApiError::not_found("not_found", "powtoon 7 not found");
        assert_eq!(e.to_string(), "not_found: powtoon 7 not found");
        assert_eq!(e.code_str(), "not_found");
        assert_eq!(e.message(), "powtoon 7 not found");
    }

    #[test]
    fn anyhow_maps_to_internal() {
        let e: ApiError = anyhow::anyhow!("disk full").into();
        assert_eq!(e.http_status(), 500);
        assert_eq!(e.message(), "disk full");
    }
}
