// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the authenticated identity, and the route guards that
//! consume it.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(identity): Auth) -> impl IntoResponse {
//!     // identity is the verified caller
//! }
//!
//! Router::new()
//!     .route("/api/v1/pegawai", post(create_pegawai))
//!     .route_layer(from_fn_with_state(
//!         RequireRole::new(&[Role::Officer, Role::Supervisor]),
//!         role_guard,
//!     ));
//! ```
//!
//! Both guards take an [`Identity`] argument. They can only run once the
//! authentication middleware has placed one in the request; without it they
//! answer 401.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{
    claims::Identity, error::AuthError, permissions::PermissionStore, roles::Role,
};
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Uses the identity set by the authentication middleware, verifying the
/// header itself only when the middleware did not run.
pub struct Auth(pub Identity);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>().cloned() {
            return Ok(Auth(identity));
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().map_err(|_| AuthError::InvalidAuthHeader))
            .transpose()?;

        let identity = state.verifier.verify(header).await?;
        parts.extensions.insert(identity.clone());
        Ok(Auth(identity))
    }
}

/// Role gate: passes for privileged roles or any role in `allowed`.
#[derive(Debug, Clone, Copy)]
pub struct RequireRole {
    allowed: &'static [Role],
}

impl RequireRole {
    pub const fn new(allowed: &'static [Role]) -> Self {
        Self { allowed }
    }

    pub fn check(&self, identity: &Identity) -> Result<(), AuthError> {
        if identity.is_privileged() || self.allowed.contains(&identity.role) {
            return Ok(());
        }
        tracing::debug!(
            user_id = %identity.subject,
            role = %identity.role,
            "role not permitted on route"
        );
        Err(AuthError::InsufficientRole)
    }
}

/// Permission gate: privileged roles bypass, everyone else asks the store.
#[derive(Clone)]
pub struct RequirePermission {
    permission: Arc<str>,
    store: Arc<dyn PermissionStore>,
}

impl RequirePermission {
    pub fn new(permission: &str, store: Arc<dyn PermissionStore>) -> Self {
        Self {
            permission: permission.into(),
            store,
        }
    }

    pub async fn check(&self, identity: &Identity) -> Result<(), AuthError> {
        if identity.is_privileged() {
            return Ok(());
        }

        match self.store.is_granted(identity.role, &self.permission).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::PermissionDenied(self.permission.to_string())),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    permission = %self.permission,
                    "permission lookup failed, denying"
                );
                Err(AuthError::PermissionDenied(self.permission.to_string()))
            }
        }
    }
}

/// Middleware form of [`RequireRole`] for `from_fn_with_state`.
pub async fn role_guard(State(gate): State<RequireRole>, request: Request, next: Next) -> Response {
    let Some(identity) = request.extensions().get::<Identity>() else {
        return AuthError::MissingAuthHeader.into_response();
    };
    if let Err(e) = gate.check(identity) {
        return e.into_response();
    }
    next.run(request).await
}

/// Middleware form of [`RequirePermission`] for `from_fn_with_state`.
pub async fn permission_guard(
    State(gate): State<RequirePermission>,
    request: Request,
    next: Next,
) -> Response {
    let Some(identity) = request.extensions().get::<Identity>() else {
        return AuthError::MissingAuthHeader.into_response();
    };
    if let Err(e) = gate.check(identity).await {
        return e.into_response();
    }
    next.run(request).await
}
