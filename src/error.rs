// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Uniform JSON error envelope.
//!
//! Every failure produced by the pipeline (authentication, authorization,
//! rate limiting) or by a handler renders the same shape:
//!
//! ```json
//! {
//!   "success": false,
//!   "error": { "code": "AUTH_INVALID_TOKEN", "message": "Invalid token" },
//!   "request_id": "6f1c…",
//!   "timestamp": "2026-01-01T00:00:00Z"
//! }
//! ```
//!
//! [`ApiError`] renders the envelope directly. The [`stamp_request_id`]
//! middleware re-renders it with the request's correlation id once that id
//! is known, so errors raised by extractors and inner layers carry it too.

use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Request id header set by `tower_http::request_id`.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthMissingToken,
    AuthInvalidToken,
    AuthTokenExpired,
    AuthKeysetUnavailable,
    AuthzForbidden,
    AuthzRoleInsufficient,
    RateLimitExceeded,
    ValInvalidFormat,
    ValPayloadTooLarge,
    NotFoundResource,
    SysDatabaseError,
    SysInternalError,
    SvcUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthMissingToken => "AUTH_MISSING_TOKEN",
            ErrorCode::AuthInvalidToken => "AUTH_INVALID_TOKEN",
            ErrorCode::AuthTokenExpired => "AUTH_TOKEN_EXPIRED",
            ErrorCode::AuthKeysetUnavailable => "AUTH_KEYSET_UNAVAILABLE",
            ErrorCode::AuthzForbidden => "AUTHZ_FORBIDDEN",
            ErrorCode::AuthzRoleInsufficient => "AUTHZ_ROLE_INSUFFICIENT",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::ValInvalidFormat => "VAL_INVALID_FORMAT",
            ErrorCode::ValPayloadTooLarge => "VAL_PAYLOAD_TOO_LARGE",
            ErrorCode::NotFoundResource => "NOT_FOUND_RESOURCE",
            ErrorCode::SysDatabaseError => "SYS_DATABASE_ERROR",
            ErrorCode::SysInternalError => "SYS_INTERNAL_ERROR",
            ErrorCode::SvcUnavailable => "SVC_UNAVAILABLE",
        }
    }

    /// HTTP status for this code.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::AuthMissingToken
            | ErrorCode::AuthInvalidToken
            | ErrorCode::AuthTokenExpired
            | ErrorCode::AuthKeysetUnavailable => StatusCode::UNAUTHORIZED,
            ErrorCode::AuthzForbidden | ErrorCode::AuthzRoleInsufficient => StatusCode::FORBIDDEN,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ValInvalidFormat => StatusCode::BAD_REQUEST,
            ErrorCode::ValPayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::NotFoundResource => StatusCode::NOT_FOUND,
            ErrorCode::SysDatabaseError | ErrorCode::SysInternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::SvcUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// An error returned to the client.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    /// Seconds until a retry may succeed (rate limiting only).
    pub retry_after: Option<u64>,
}

/// Error details attached to the response as an extension.
///
/// Read by [`stamp_request_id`] to re-render the envelope and by the audit
/// middleware to record the error message.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// The JSON error envelope.
#[derive(Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorDetail,
    /// Correlation id of the failed request.
    pub request_id: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

impl ErrorEnvelope {
    fn new(report: &ErrorReport, request_id: &str) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: report.code,
                message: report.message.clone(),
            },
            request_id: request_id.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status(),
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFoundResource, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValInvalidFormat, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SysInternalError, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SysDatabaseError, message)
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = ErrorReport {
            code: self.code,
            message: self.message,
        };
        let mut response = (self.status, Json(ErrorEnvelope::new(&report, ""))).into_response();

        if let Some(seconds) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response.extensions_mut().insert(report);
        response
    }
}

/// Middleware that fills the request id into error envelopes.
///
/// Must run inside the request-id layer so the header is already set.
pub async fn stamp_request_id(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let response = next.run(request).await;

    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    let body = Json(ErrorEnvelope::new(&report, &request_id)).into_response();
    let (body_parts, body) = body.into_parts();
    parts.headers.insert(
        header::CONTENT_TYPE,
        body_parts
            .headers
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/json")),
    );
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, body)
}
