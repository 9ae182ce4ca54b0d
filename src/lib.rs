// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HRMS Server - Multi-tenant HR records API
//!
//! The request pipeline every HR record endpoint runs behind: bearer-token
//! identity from the organisation's identity provider, role and permission
//! gates, per-client rate limits, a redacted audit trail, and the Postgres
//! session context that row-level security policies isolate units by.
//!
//! ## Modules
//!
//! - `api` - Router assembly, health probes, API docs
//! - `audit` - Audit records, background persistence, middleware
//! - `auth` - Token verification, roles, permission gates
//! - `db` - RLS-scoped transactions
//! - `ratelimit` - Fixed-window limits and their layers
//! - `redact` - PII masking for audit payloads

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ratelimit;
pub mod redact;
pub mod state;
pub mod telemetry;
