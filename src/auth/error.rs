// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::{ApiError, ErrorCode};

/// Authentication / authorization error type.
///
/// Every variant except the `Forbidden` family maps to 401. Expiry is kept
/// distinct from other invalid tokens so clients can refresh instead of
/// re-authenticating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Header is not of the form `Bearer <token>`
    InvalidAuthHeader,
    /// Signature, structure, issuer or audience check failed
    InvalidToken,
    /// Token has expired
    TokenExpired,
    /// Token carries an empty `sub` claim
    MissingSubject,
    /// The key set could not be obtained from the identity provider
    KeySetUnavailable(String),
    /// Resolved role is not in the allowed set
    InsufficientRole,
    /// The permission store denied the requested permission
    PermissionDenied(String),
}

impl AuthError {
    /// Application error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => {
                ErrorCode::AuthMissingToken
            }
            AuthError::InvalidToken | AuthError::MissingSubject => ErrorCode::AuthInvalidToken,
            AuthError::TokenExpired => ErrorCode::AuthTokenExpired,
            AuthError::KeySetUnavailable(_) => ErrorCode::AuthKeysetUnavailable,
            AuthError::InsufficientRole => ErrorCode::AuthzRoleInsufficient,
            AuthError::PermissionDenied(_) => ErrorCode::AuthzForbidden,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.error_code().status()
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is missing"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::MissingSubject => write!(f, "Invalid token: missing subject"),
            // The upstream reason is logged by the key-set manager, not returned.
            AuthError::KeySetUnavailable(_) => write!(f, "Unable to verify token"),
            AuthError::InsufficientRole => write!(f, "Insufficient permissions"),
            AuthError::PermissionDenied(permission) => {
                write!(f, "Missing permission: {permission}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::new(err.error_code(), err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
