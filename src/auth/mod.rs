// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication and route authorization for the HR records API.
//!
//! ## Auth Flow
//!
//! 1. Frontend authenticates the user with the identity provider (Keycloak)
//! 2. Frontend sends `Authorization: Bearer <access token>`
//! 3. This server:
//!    - Fetches the provider's JWKS over HTTPS (cached, refreshed on unknown `kid`)
//!    - Verifies signature, expiry, issuer, audience
//!    - Extracts:
//!      - `sub` → subject
//!      - `realm_access.roles` → resolved canonical [`Role`]
//!      - `unit_kerja_id` → organisational unit
//! 4. Route guards ([`RequireRole`], [`RequirePermission`]) check the identity
//!
//! ## Security
//!
//! - All paths outside [`verifier::PUBLIC_PATHS`] require authentication
//! - Key-set fetch failure rejects the request; there is no unverified mode
//! - Clock skew tolerance is 60 seconds
//! - The admin bypass in the guards is a shortcut only; tenant isolation is
//!   enforced by the database policies

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod permissions;
pub mod roles;
pub mod verifier;

pub use claims::Identity;
pub use error::AuthError;
pub use extractor::{permission_guard, role_guard, Auth, RequirePermission, RequireRole};
pub use jwks::{HttpKeySetSource, JwksManager, KeySetSource, StaticKeySetSource};
pub use middleware::{authenticate, IdentityCell};
pub use permissions::{
    AllowAllPermissions, DenyAllPermissions, PermissionStore, PgPermissionStore, StaticPermissions,
};
pub use roles::Role;
pub use verifier::IdentityVerifier;
