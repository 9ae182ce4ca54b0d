// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Runs on every route. Public paths pass through untouched; everything else
//! must carry a valid bearer token. On success the request gains:
//!
//! - the [`Identity`], read by [`Auth`](super::Auth) and the route guards
//! - the [`SessionContext`], required to open a database transaction
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/api/v1/pegawai", get(list_pegawai))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.verifier.clone(),
//!         authenticate,
//!     ));
//! ```

use std::sync::{Arc, OnceLock};

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{
    claims::Identity,
    error::AuthError,
    verifier::{is_public_path, IdentityVerifier},
};
use crate::db::SessionContext;

/// Slot an outer layer places in the request to learn who the caller was.
///
/// The audit layer wraps authentication, so it cannot read the identity from
/// the request it forwarded. It inserts a cell instead, which this
/// middleware fills once the token is verified.
#[derive(Debug, Clone, Default)]
pub struct IdentityCell(Arc<OnceLock<Identity>>);

impl IdentityCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&Identity> {
        self.0.get()
    }

    fn set(&self, identity: Identity) {
        let _ = self.0.set(identity);
    }
}

/// Authentication middleware function.
pub async fn authenticate(
    State(verifier): State<IdentityVerifier>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let header = match request
        .headers()
        .get(AUTHORIZATION)
        .map(|v| v.to_str())
        .transpose()
    {
        Ok(header) => header,
        Err(_) => return AuthError::InvalidAuthHeader.into_response(),
    };

    let identity = match verifier.verify(header).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(
                error = %e,
                path = %request.uri().path(),
                "authentication failed"
            );
            return e.into_response();
        }
    };

    tracing::debug!(
        user_id = %identity.subject,
        role = %identity.role,
        "request authenticated"
    );

    if let Some(cell) = request.extensions().get::<IdentityCell>() {
        cell.set(identity.clone());
    }
    request
        .extensions_mut()
        .insert(SessionContext::from_identity(&identity));
    request.extensions_mut().insert(identity);

    next.run(request).await
}
