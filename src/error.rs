use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

pub type AppResult<T> = Result<T, AppError>;

/// Protocol error codes returned to OAuth clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorKind {
    AccessDenied,
    InvalidClient,
    InvalidGrant,
    InvalidRequest,
    InvalidScope,
    InvalidToken,
    UnsupportedResponseType,
    UnsupportedGrantType,
}

impl OAuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthErrorKind::AccessDenied => "access_denied",
            OAuthErrorKind::InvalidClient => "invalid_client",
            OAuthErrorKind::InvalidGrant => "invalid_grant",
            OAuthErrorKind::InvalidRequest => "invalid_request",
            OAuthErrorKind::InvalidScope => "invalid_scope",
            OAuthErrorKind::InvalidToken => "invalid_token",
            OAuthErrorKind::UnsupportedResponseType => "unsupported_response_type",
            OAuthErrorKind::UnsupportedGrantType => "unsupported_grant_type",
        }
    }
}

impl fmt::Display for OAuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {description}")]
pub struct OAuthError {
    pub kind: OAuthErrorKind,
    pub description: String,
}

impl OAuthError {
    pub fn new(kind: OAuthErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorKind::InvalidClient, description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorKind::InvalidGrant, description)
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorKind::InvalidRequest, description)
    }

    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorKind::InvalidScope, description)
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorKind::InvalidToken, description)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("rate limit exceeded: {reason}")]
    RateLimited {
        reason: String,
        retry_after: i64,
        limit: i64,
        current: i64,
    },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid request body: {0}")]
    JsonRejection(#[from] axum::extract::rejection::JsonRejection),
    #[error("invalid request body: {0}")]
    FormRejection(#[from] axum_extra::extract::FormRejection),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Storage and internal failures, never reported to callers verbatim.
    pub fn is_server_failure(&self) -> bool {
        matches!(
            self,
            AppError::Sqlx(_) | AppError::Serialization(_) | AppError::Other(_)
        )
    }

    pub fn oauth_kind(&self) -> Option<OAuthErrorKind> {
        match self {
            AppError::OAuth(e) => Some(e.kind),
            _ => None,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: &'static str,
    pub error_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<i64>,
}

impl ErrorBody {
    fn new(error: &'static str, error_description: String) -> Self {
        Self {
            error,
            error_description,
            retry_after: None,
            limit: None,
            current: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_failure() {
            tracing::error!(error = %self, "request failed with server error");
        }
        let (status, body) = match self {
            AppError::OAuth(e) => {
                let status = match e.kind {
                    OAuthErrorKind::InvalidToken => StatusCode::UNAUTHORIZED,
                    OAuthErrorKind::AccessDenied => StatusCode::FORBIDDEN,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, ErrorBody::new(e.kind.as_str(), e.description))
            }
            AppError::Unauthenticated(message) => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorBody::new("unauthenticated", message)),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            AppError::RateLimited {
                reason,
                retry_after,
                limit,
                current,
            } => {
                let body = ErrorBody {
                    error: "rate_limited",
                    error_description: format!("Rate limit exceeded: {reason}"),
                    retry_after: Some(retry_after),
                    limit: Some(limit),
                    current: Some(current),
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.max(0)));
                return response;
            }
            AppError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, ErrorBody::new("forbidden", message))
            }
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorBody::new("not_found", "Resource not found".to_string()),
            ),
            AppError::Conflict(message) => (StatusCode::CONFLICT, ErrorBody::new("conflict", message)),
            AppError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("validation_error", message),
            ),
            AppError::JsonRejection(e) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(OAuthErrorKind::InvalidRequest.as_str(), e.to_string()),
            ),
            AppError::FormRejection(e) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(OAuthErrorKind::InvalidRequest.as_str(), e.to_string()),
            ),
            AppError::Sqlx(_) | AppError::Serialization(_) | AppError::Other(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("server_error", "Internal server error".to_string()),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_not_protocol_errors() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_server_failure());
        assert_eq!(err.oauth_kind(), None);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_token_maps_to_unauthorized() {
        let err = AppError::from(OAuthError::invalid_token("Token expired"));
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let err = AppError::RateLimited {
            reason: "3 requests per minute".into(),
            retry_after: 42,
            limit: 3,
            current: 3,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
