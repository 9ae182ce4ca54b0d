// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Permission stores consulted by [`RequirePermission`](super::extractor::RequirePermission).
//!
//! | Store | Answer |
//! |-------|--------|
//! | [`DenyAllPermissions`] | always denied (baseline) |
//! | [`AllowAllPermissions`] | always granted; temporary policy, warns on every grant |
//! | [`StaticPermissions`] | in-memory role → permission table |
//! | [`PgPermissionStore`] | `app_role_permissions` join in Postgres |

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::PgPool;

use super::roles::Role;

/// Permission-store lookup failure.
#[derive(Debug, thiserror::Error)]
#[error("permission lookup failed: {0}")]
pub struct PermissionStoreError(pub String);

impl From<sqlx::Error> for PermissionStoreError {
    fn from(err: sqlx::Error) -> Self {
        Self(err.to_string())
    }
}

/// Answers whether a role holds a permission code (e.g. `kepegawaian.update`).
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn is_granted(&self, role: Role, permission: &str) -> Result<bool, PermissionStoreError>;
}

/// Denies everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllPermissions;

#[async_trait]
impl PermissionStore for DenyAllPermissions {
    async fn is_granted(&self, _role: Role, _permission: &str) -> Result<bool, PermissionStoreError> {
        Ok(false)
    }
}

/// Grants everything.
///
/// Temporary policy for deployments whose permission tables are not yet
/// populated. Only installed through `PERMISSION_POLICY=allow-all`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllPermissions;

#[async_trait]
impl PermissionStore for AllowAllPermissions {
    async fn is_granted(&self, role: Role, permission: &str) -> Result<bool, PermissionStoreError> {
        tracing::warn!(
            role = %role,
            permission,
            "permission granted by allow-all policy"
        );
        Ok(true)
    }
}

/// In-memory permission table.
#[derive(Debug, Default, Clone)]
pub struct StaticPermissions {
    grants: HashMap<Role, HashSet<String>>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, role: Role, permission: impl Into<String>) -> Self {
        self.grants.entry(role).or_default().insert(permission.into());
        self
    }
}

#[async_trait]
impl PermissionStore for StaticPermissions {
    async fn is_granted(&self, role: Role, permission: &str) -> Result<bool, PermissionStoreError> {
        Ok(self
            .grants
            .get(&role)
            .is_some_and(|granted| granted.contains(permission)))
    }
}

/// Permission lookup against the RBAC tables.
#[derive(Clone)]
pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const GRANT_QUERY: &str = r#"
SELECT EXISTS (
    SELECT 1
      FROM app_role_permissions rp
      JOIN app_roles r ON r.id = rp.role_id
      JOIN app_permissions p ON p.id = rp.permission_id
     WHERE r.role_code = $1
       AND r.is_active = true
       AND p.kode = $2
)
"#;

#[async_trait]
impl PermissionStore for PgPermissionStore {
    async fn is_granted(&self, role: Role, permission: &str) -> Result<bool, PermissionStoreError> {
        let granted: bool = sqlx::query_scalar(GRANT_QUERY)
            .bind(role.as_str())
            .bind(permission)
            .fetch_one(&self.pool)
            .await?;
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deny_all_denies() {
        assert!(!DenyAllPermissions.is_granted(Role::Supervisor, "x.read").await.unwrap());
    }

    #[tokio::test]
    async fn allow_all_grants() {
        assert!(AllowAllPermissions.is_granted(Role::User, "x.delete").await.unwrap());
    }

    #[tokio::test]
    async fn static_table_is_keyed_by_role_and_permission() {
        let store = StaticPermissions::new()
            .grant(Role::Officer, "kepegawaian.update")
            .grant(Role::Staff, "kepegawaian.read");

        assert!(store.is_granted(Role::Officer, "kepegawaian.update").await.unwrap());
        assert!(!store.is_granted(Role::Staff, "kepegawaian.update").await.unwrap());
        assert!(!store.is_granted(Role::User, "kepegawaian.read").await.unwrap());
    }
}
