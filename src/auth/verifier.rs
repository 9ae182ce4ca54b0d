// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer-token verification.
//!
//! Turns a raw `Authorization` header value into an [`Identity`]:
//!
//! 1. Parse `Bearer <token>`
//! 2. Pick the verification key by `kid` (or try every key when absent)
//! 3. Verify signature, expiry (60s leeway), issuer and audience
//! 4. Build the identity from the claims

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Validation};

use super::{
    claims::{Identity, TokenClaims},
    error::AuthError,
    jwks::{JwksManager, VerificationKey},
};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Paths that bypass verification. Anything not listed requires a token.
pub const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/api/v1/auth/login",
    "/api/v1/public",
    "/docs",
    "/api-doc",
];

/// Whether `path` is on the public allow-list.
///
/// Matches whole segments, so `/healthz` is not public.
pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|public| {
        path == *public
            || path
                .strip_prefix(public)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Extract the token from a `Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingAuthHeader)?;
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Verifies tokens against the identity provider's key set.
#[derive(Clone)]
pub struct IdentityVerifier {
    keys: Arc<JwksManager>,
    issuer: Option<String>,
    audience: Option<String>,
}

impl IdentityVerifier {
    pub fn new(keys: Arc<JwksManager>) -> Self {
        Self {
            keys,
            issuer: None,
            audience: None,
        }
    }

    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    pub fn keys(&self) -> &JwksManager {
        &self.keys
    }

    /// Verify a raw `Authorization` header value.
    pub async fn verify(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        let token = bearer_token(header)?;
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;

        let claims = match header.kid.as_deref() {
            Some(kid) => {
                let key = self.keys.key_for(kid).await?;
                self.decode(token, &key)?
            }
            None => self.decode_with_any(token).await?,
        };

        Identity::from_claims(claims)
    }

    /// Tokens without `kid`: accept the first key that verifies.
    async fn decode_with_any(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let snapshot = self.keys.keys().await?;
        let mut last = AuthError::InvalidToken;
        for key in &snapshot.keys {
            match self.decode(token, key) {
                Ok(claims) => return Ok(claims),
                Err(AuthError::TokenExpired) => return Err(AuthError::TokenExpired),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    fn decode(&self, token: &str, key: &VerificationKey) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(key.algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        decode::<TokenClaims>(token, &key.key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                kind => {
                    tracing::debug!(error = ?kind, "token rejected");
                    AuthError::InvalidToken
                }
            })
    }
}
