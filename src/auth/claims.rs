// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and the per-request identity derived from them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{error::AuthError, roles::Role};

/// Claims read from an identity-provider access token.
///
/// Keycloak-style layout: realm roles are nested under
/// `realm_access.roles`. Everything except `sub` is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    /// Subject (external user id)
    #[serde(default)]
    pub sub: String,

    /// Expiration timestamp (validated by `jsonwebtoken`)
    #[serde(default)]
    pub exp: i64,

    /// Realm access block; kept loose so an odd shape does not reject the token
    #[serde(default)]
    pub realm_access: Option<serde_json::Value>,

    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Organisational unit the user belongs to
    #[serde(default, alias = "unit_id")]
    pub unit_kerja_id: Option<String>,
}

impl TokenClaims {
    /// String role names from `realm_access.roles`; non-strings are skipped.
    pub fn realm_roles(&self) -> Vec<String> {
        self.realm_access
            .as_ref()
            .and_then(|access| access.get("roles"))
            .and_then(|roles| roles.as_array())
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Identity of the caller, resolved from a verified token.
///
/// Lives for one request and is never persisted. Handlers, gates and the
/// session-context propagator all take it explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    /// External user id (`sub`)
    pub subject: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    /// Raw role names carried by the token
    pub roles: Vec<String>,
    /// Canonical resolved role
    pub role: Role,
    /// Organisational unit (tenancy boundary)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
}

impl Identity {
    /// Build an identity from verified claims.
    pub fn from_claims(claims: TokenClaims) -> Result<Self, AuthError> {
        let subject = claims.sub.trim().to_string();
        if subject.is_empty() {
            return Err(AuthError::MissingSubject);
        }

        let roles = claims.realm_roles();
        let role = Role::resolve(&roles);

        Ok(Self {
            subject,
            username: claims.preferred_username.unwrap_or_default(),
            email: claims.email.unwrap_or_default(),
            display_name: claims.name.unwrap_or_default(),
            roles,
            role,
            unit_id: claims
                .unit_kerja_id
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
        })
    }

    /// Whether the resolved role bypasses application gates.
    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_claims() -> TokenClaims {
        serde_json::from_value(json!({
            "sub": "b7d0c7a2-1111-4a5e-9a61-3f6f4e3c2d10",
            "exp": 1_700_003_600,
            "realm_access": { "roles": ["offline_access", "staff", "supervisor", 7] },
            "preferred_username": "siti",
            "email": "siti@example.go.id",
            "name": "Siti Rahma",
            "unit_kerja_id": "3f1e9c1c-8c1b-4c44-8d8d-2b0c2f6e0a01"
        }))
        .unwrap()
    }

    #[test]
    fn from_claims_extracts_identity() {
        let identity = Identity::from_claims(sample_claims()).unwrap();
        assert_eq!(identity.subject, "b7d0c7a2-1111-4a5e-9a61-3f6f4e3c2d10");
        assert_eq!(identity.username, "siti");
        assert_eq!(identity.email, "siti@example.go.id");
        assert_eq!(identity.display_name, "Siti Rahma");
        assert_eq!(identity.roles, vec!["offline_access", "staff", "supervisor"]);
        assert_eq!(identity.role, Role::Supervisor);
        assert_eq!(
            identity.unit_id.as_deref(),
            Some("3f1e9c1c-8c1b-4c44-8d8d-2b0c2f6e0a01")
        );
    }

    #[test]
    fn missing_subject_is_rejected() {
        let mut claims = sample_claims();
        claims.sub = "   ".to_string();
        assert_eq!(
            Identity::from_claims(claims).unwrap_err(),
            AuthError::MissingSubject
        );
    }

    #[test]
    fn optional_claims_default_to_empty() {
        let claims: TokenClaims = serde_json::from_value(json!({ "sub": "u1" })).unwrap();
        let identity = Identity::from_claims(claims).unwrap();
        assert_eq!(identity.username, "");
        assert_eq!(identity.email, "");
        assert!(identity.roles.is_empty());
        assert_eq!(identity.role, Role::User);
        assert!(identity.unit_id.is_none());
    }

    #[test]
    fn malformed_realm_access_yields_no_roles() {
        let claims: TokenClaims =
            serde_json::from_value(json!({ "sub": "u1", "realm_access": "admin" })).unwrap();
        assert!(claims.realm_roles().is_empty());
    }
}
