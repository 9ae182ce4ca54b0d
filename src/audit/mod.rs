// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Audit Trail
//!
//! Every mutating request produces exactly one [`AuditRecord`], whether it
//! succeeded, was rejected by the pipeline, or was abandoned by the client.
//!
//! ## Flow
//!
//! 1. [`middleware::audit`] captures the JSON body (redacted on attach)
//! 2. The request runs; the outcome and actor are filled in
//! 3. [`AuditRecorder::record`] queues the record without waiting
//! 4. Worker tasks persist it through an [`AuditStore`]
//!
//! ## Stores
//!
//! | Store | Target |
//! |-------|--------|
//! | [`PgAuditStore`] | `audit_logs` table |
//! | [`TracingAuditStore`] | log output only |

pub mod middleware;
pub mod record;
pub mod recorder;
pub mod store;

pub use middleware::{audit, AuditLayer};
pub use record::{AuditAction, AuditRecord, AuditStatus};
pub use recorder::{AuditRecorder, AuditWorkers};
pub use store::{AuditError, AuditStore, PgAuditStore, TracingAuditStore};
