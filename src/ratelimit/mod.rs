// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Rate Limiting
//!
//! Fixed-window, in-process counters. Limits apply per instance; several
//! instances behind a load balancer each count on their own.
//!
//! | Policy | Key | Default |
//! |--------|-----|---------|
//! | `global` | client IP | 100 / minute |
//! | `login` | client IP | 5 / 15 minutes |
//! | `upload` | user id, else IP | 10 / minute |
//! | `api_key` | `X-API-Key` fingerprint, else IP | 1000 / minute |
//! | custom | user id, else IP | per route |

pub mod limiter;
pub mod middleware;

pub use limiter::{Decision, FixedWindow, RateLimiter};
pub use middleware::{client_ip, rate_limit, KeyStrategy, RateLimitError, RateLimitGuard};
