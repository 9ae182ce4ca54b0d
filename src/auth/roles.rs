// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles and canonical role resolution.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Canonical user roles.
///
/// ## Role Hierarchy
///
/// Highest precedence first:
///
/// - `Admin` - Administrative role; bypasses application gates and is the
///   value the database recognises for cross-unit access
/// - `Supervisor` - Manages records across their unit
/// - `Officer` - HR officer within a unit
/// - `Staff` - Regular staff access
/// - `User` - Lowest tier, assigned when no known role is present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Supervisor,
    Officer,
    Staff,
    #[default]
    User,
}

impl Role {
    /// All roles, highest precedence first.
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Supervisor,
        Role::Officer,
        Role::Staff,
        Role::User,
    ];

    /// Precedence value; higher wins. Values are distinct.
    pub fn precedence(&self) -> u8 {
        match self {
            Role::Admin => 100,
            Role::Supervisor => 80,
            Role::Officer => 60,
            Role::Staff => 40,
            Role::User => 20,
        }
    }

    /// Whether this role skips application-level role and permission gates.
    ///
    /// Advisory only. Cross-unit visibility is decided by the database row
    /// policies, which receive the role through the session context.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Parse a role name (case-insensitive). Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "supervisor" => Some(Role::Supervisor),
            "officer" => Some(Role::Officer),
            "staff" => Some(Role::Staff),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    /// Role name as recognised by the database policies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supervisor => "supervisor",
            Role::Officer => "officer",
            Role::Staff => "staff",
            Role::User => "user",
        }
    }

    /// Resolve a set of role names to the single highest-precedence role.
    ///
    /// Unknown names are ignored. Defaults to [`Role::User`].
    pub fn resolve<I, S>(names: I) -> Role
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| Role::parse(name.as_ref()))
            .max_by_key(Role::precedence)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
