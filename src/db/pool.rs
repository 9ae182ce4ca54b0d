// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connection pool and RLS-scoped transactions.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};

use super::session::{apply, SessionContext, SessionContextError};

/// How long a request waits for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the connection pool.
///
/// The URL is never logged since it may carry credentials.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(url)?;
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
}

/// Handle to the RLS-enforcing database.
#[derive(Clone)]
pub struct RlsDatabase {
    pool: PgPool,
}

impl RlsDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Raw pool, for tables outside row-level security (audit log, RBAC).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction scoped to the caller.
    ///
    /// The settings are transaction-local, so they vanish at commit or
    /// rollback and never leak to the next user of the pooled connection.
    pub async fn begin(
        &self,
        context: &SessionContext,
    ) -> Result<Transaction<'static, Postgres>, SessionContextError> {
        let mut tx = self.pool.begin().await.map_err(SessionContextError::Begin)?;
        apply(&mut *tx, context).await?;
        Ok(tx)
    }

    /// Connectivity probe for readiness checks.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }
}
