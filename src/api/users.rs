// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, Identity, Role};

/// Response for GET /api/v1/auth/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    /// Subject id issued by the identity provider
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    /// Effective role
    pub role: Role,
    /// Every role listed in the token
    pub roles: Vec<String>,
    /// Organisational unit, if the token carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
}

impl From<Identity> for UserMeResponse {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: identity.subject,
            username: identity.username,
            email: identity.email,
            name: identity.display_name,
            role: identity.role,
            roles: identity.roles,
            unit_id: identity.unit_id,
        }
    }
}

/// Get the current authenticated user's information.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(Auth(identity): Auth) -> Json<UserMeResponse> {
    Json(identity.into())
}
