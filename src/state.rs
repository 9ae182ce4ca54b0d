// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::{
    audit::AuditRecorder,
    auth::{IdentityVerifier, PermissionStore},
    db::RlsDatabase,
    ratelimit::RateLimiter,
};

/// Everything a request may need, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub verifier: IdentityVerifier,
    pub permissions: Arc<dyn PermissionStore>,
    pub limiter: Arc<RateLimiter>,
    pub audit: AuditRecorder,
    /// Absent in tests that never touch the database.
    pub db: Option<RlsDatabase>,
    /// Honour `X-Forwarded-For` / `X-Real-IP` for client addresses.
    pub trust_proxy_headers: bool,
}

impl AppState {
    pub fn new(
        verifier: IdentityVerifier,
        permissions: Arc<dyn PermissionStore>,
        limiter: Arc<RateLimiter>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            verifier,
            permissions,
            limiter,
            audit,
            db: None,
            trust_proxy_headers: false,
        }
    }

    pub fn with_database(mut self, db: RlsDatabase) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_trusted_proxy(mut self, trust_proxy_headers: bool) -> Self {
        self.trust_proxy_headers = trust_proxy_headers;
        self
    }
}
