// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Database Access
//!
//! Every query against tenant data runs inside a transaction opened by
//! [`RlsDatabase::begin`], which first writes the caller's identity into
//! transaction-local settings. The row-level-security policies read those
//! settings; without them they expose nothing.
//!
//! | Setting | Value |
//! |---------|-------|
//! | `request.jwt.claim.user_id` | token subject |
//! | `request.jwt.claim.unit_kerja_id` | organisational unit (empty when absent) |
//! | `request.jwt.claim.role` | resolved canonical role |

pub mod pool;
pub mod session;

pub use pool::{connect, RlsDatabase};
pub use session::{SessionContext, SessionContextError};
