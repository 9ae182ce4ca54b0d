// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum layers applying a [`FixedWindow`] policy.
//!
//! ```rust,ignore
//! let login = RateLimitGuard::client_ip(state.limiter.login.clone(), trust_proxy);
//! Router::new()
//!     .route("/api/v1/auth/login", post(login_handler))
//!     .route_layer(from_fn_with_state(login, rate_limit));
//! ```
//!
//! Layers keyed by user must sit inside the authentication middleware so the
//! [`Identity`] is present; the per-IP layers may sit anywhere.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use super::limiter::{Decision, FixedWindow};
use crate::auth::Identity;
use crate::error::{ApiError, ErrorCode};

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Rate-limit rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Too many requests, try again in {retry_after_secs} seconds")]
pub struct RateLimitError {
    pub retry_after_secs: u64,
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        ApiError::new(ErrorCode::RateLimitExceeded, err.to_string())
            .with_retry_after(err.retry_after_secs)
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// How a request is mapped to a counter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Client IP.
    ClientIp,
    /// Authenticated subject, else client IP.
    UserOrIp,
    /// SHA-256 fingerprint of `X-API-Key`, else client IP in a separate namespace.
    ApiKeyOrIp,
}

/// State for the [`rate_limit`] middleware.
#[derive(Clone)]
pub struct RateLimitGuard {
    policy: Arc<FixedWindow>,
    strategy: KeyStrategy,
    trust_proxy_headers: bool,
    scope: Option<fn(&str) -> bool>,
}

impl RateLimitGuard {
    pub fn new(policy: Arc<FixedWindow>, strategy: KeyStrategy, trust_proxy_headers: bool) -> Self {
        Self {
            policy,
            strategy,
            trust_proxy_headers,
            scope: None,
        }
    }

    /// Only count requests whose path matches `scope`.
    pub fn scoped(mut self, scope: fn(&str) -> bool) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn applies_to(&self, path: &str) -> bool {
        self.scope.is_none_or(|scope| scope(path))
    }

    pub fn client_ip(policy: Arc<FixedWindow>, trust_proxy_headers: bool) -> Self {
        Self::new(policy, KeyStrategy::ClientIp, trust_proxy_headers)
    }

    pub fn user_or_ip(policy: Arc<FixedWindow>, trust_proxy_headers: bool) -> Self {
        Self::new(policy, KeyStrategy::UserOrIp, trust_proxy_headers)
    }

    pub fn api_key_or_ip(policy: Arc<FixedWindow>, trust_proxy_headers: bool) -> Self {
        Self::new(policy, KeyStrategy::ApiKeyOrIp, trust_proxy_headers)
    }

    /// Counter key for this request.
    pub fn key_for(&self, request: &Request) -> String {
        let ip = || client_ip(request, self.trust_proxy_headers);
        let subject = match self.strategy {
            KeyStrategy::ClientIp => ip(),
            KeyStrategy::UserOrIp => request
                .extensions()
                .get::<Identity>()
                .map(|identity| identity.subject.clone())
                .unwrap_or_else(ip),
            KeyStrategy::ApiKeyOrIp => match api_key_fingerprint(request.headers()) {
                Some(fingerprint) => fingerprint,
                None => format!("noapikey_{}", ip()),
            },
        };
        self.policy.key(&subject)
    }

    pub fn check(&self, request: &Request) -> Result<(), RateLimitError> {
        let key = self.key_for(request);
        match self.policy.check(&key) {
            Decision::Allowed => Ok(()),
            Decision::Limited { retry_after } => {
                tracing::debug!(
                    policy = self.policy.name(),
                    retry_after_secs = retry_after.as_secs(),
                    "rate limit exceeded"
                );
                Err(RateLimitError {
                    retry_after_secs: (retry_after.as_secs_f64().ceil() as u64).max(1),
                })
            }
        }
    }
}

/// Rate-limit middleware for `from_fn_with_state`.
pub async fn rate_limit(State(guard): State<RateLimitGuard>, request: Request, next: Next) -> Response {
    if !guard.applies_to(request.uri().path()) {
        return next.run(request).await;
    }
    if let Err(e) = guard.check(&request) {
        return e.into_response();
    }
    next.run(request).await
}

/// Best-effort client IP.
///
/// Proxy headers are only honoured when `trust_proxy_headers` is set; the
/// peer address from `ConnectInfo` is used otherwise.
pub fn client_ip(request: &Request, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    ["x-forwarded-for", "x-real-ip"].iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        let first = value.split(',').next()?.trim();
        first
            .parse::<std::net::IpAddr>()
            .ok()
            .map(|ip| ip.to_string())
    })
}

/// Hex SHA-256 prefix of the API key; the raw key is never used as a map key.
fn api_key_fingerprint(headers: &HeaderMap) -> Option<String> {
    let key = headers.get(API_KEY_HEADER)?.to_str().ok()?.trim();
    if key.is_empty() {
        return None;
    }
    let digest = Sha256::digest(key.as_bytes());
    Some(digest[..16].iter().map(|b| format!("{b:02x}")).collect())
}
