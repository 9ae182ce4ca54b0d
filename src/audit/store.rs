// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit persistence backends.

use async_trait::async_trait;
use sqlx::PgPool;

use super::record::AuditRecord;

/// Audit persistence errors. Logged by the workers, never surfaced to clients.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit persistence failed: {0}")]
    Persist(String),

    #[error("audit persistence timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("audit queue full, record dropped")]
    QueueFull,

    #[error("audit queue closed, record dropped")]
    Closed,
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        AuditError::Persist(err.to_string())
    }
}

/// Accepts one audit record per call.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Inserts into the `audit_logs` table.
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_AUDIT_LOG: &str = r#"
INSERT INTO audit_logs (
    id, user_id, username, action, resource, resource_id,
    ip_address, user_agent, changes, status, error_message, created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
"#;

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
        sqlx::query(INSERT_AUDIT_LOG)
            .bind(record.id)
            .bind(&record.user_id)
            .bind(&record.username)
            .bind(record.action.as_str())
            .bind(&record.resource_type)
            .bind(record.resource_id)
            .bind(&record.ip_address)
            .bind(&record.user_agent)
            .bind(sqlx::types::Json(record.changes()))
            .bind(record.status.as_str())
            .bind(&record.error_message)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Writes records to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditStore;

#[async_trait]
impl AuditStore for TracingAuditStore {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let changes = record.changes();
        tracing::info!(
            target: "audit",
            id = %record.id,
            changes = %changes,
            "audit record (log only)"
        );
        Ok(())
    }
}
