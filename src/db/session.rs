// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session context handed to the row-level-security policies.

use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::PgConnection;

use crate::auth::{AuthError, Identity, Role};
use crate::error::ApiError;

pub const USER_ID_SETTING: &str = "request.jwt.claim.user_id";
pub const UNIT_ID_SETTING: &str = "request.jwt.claim.unit_kerja_id";
pub const ROLE_SETTING: &str = "request.jwt.claim.role";

/// Failure to establish the session context.
#[derive(Debug, thiserror::Error)]
pub enum SessionContextError {
    #[error("failed to open transaction: {0}")]
    Begin(#[source] sqlx::Error),

    #[error("failed to set {setting}: {source}")]
    Apply {
        setting: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl From<SessionContextError> for ApiError {
    fn from(err: SessionContextError) -> Self {
        tracing::error!(error = %err, "session context setup failed");
        ApiError::database("Database unavailable")
    }
}

/// The identity claims the database evaluates on every row check.
///
/// Only obtainable from a verified [`Identity`]; there is no way to build
/// one with an arbitrary role. Administrative access is just the `admin`
/// role value, which the policies themselves recognise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    user_id: String,
    unit_id: String,
    role: Role,
}

impl SessionContext {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            user_id: identity.subject.clone(),
            unit_id: identity.unit_id.clone().unwrap_or_default(),
            role: identity.role,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Settings in the order they are applied.
    pub fn settings(&self) -> [(&'static str, &str); 3] {
        [
            (USER_ID_SETTING, self.user_id.as_str()),
            (UNIT_ID_SETTING, self.unit_id.as_str()),
            (ROLE_SETTING, self.role.as_str()),
        ]
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}

/// Write the context into the current transaction.
///
/// `set_config(.., true)` is the function form of `SET LOCAL` and accepts
/// bind parameters.
pub async fn apply(conn: &mut PgConnection, context: &SessionContext) -> Result<(), SessionContextError> {
    for (setting, value) in context.settings() {
        sqlx::query("SELECT set_config($1, $2, true)")
            .bind(setting)
            .bind(value)
            .execute(&mut *conn)
            .await
            .map_err(|source| SessionContextError::Apply { setting, source })?;
    }
    Ok(())
}
