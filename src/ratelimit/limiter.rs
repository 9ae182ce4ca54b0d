// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed-window counters.
//!
//! Each policy owns its own counter map, split into striped shards so that
//! unrelated keys rarely contend. A shard is a `Mutex<LruCache>`: the whole
//! read-check-increment for one key happens under its lock, so two requests
//! can never both observe `max - 1` and both pass. The LRU bound caps how
//! many keys a policy retains; the least recently seen key is evicted first.

use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use crate::config::{LimitSetting, RateLimitSettings};

/// Number of lock stripes per policy.
const SHARDS: usize = 16;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// One rate-limit policy and its counters.
pub struct FixedWindow {
    name: String,
    prefix: String,
    limit: LimitSetting,
    shards: Vec<Mutex<LruCache<String, Window>>>,
    hasher: RandomState,
}

impl FixedWindow {
    /// `max_tracked_keys` is spread evenly over the shards.
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        limit: LimitSetting,
        max_tracked_keys: usize,
    ) -> Self {
        let per_shard = NonZeroUsize::new(max_tracked_keys.div_ceil(SHARDS)).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.into(),
            prefix: prefix.into(),
            limit,
            shards: (0..SHARDS)
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
            hasher: RandomState::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> LimitSetting {
        self.limit
    }

    /// Namespaced counter key, e.g. `login_10.0.0.7`.
    pub fn key(&self, subject: &str) -> String {
        format!("{}{}", self.prefix, subject)
    }

    /// Whether one more request for `key` fits in the current window.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Check against an explicit clock reading.
    ///
    /// A denied request does not advance the counter.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        if self.limit.max == 0 {
            return Decision::Limited {
                retry_after: self.limit.window,
            };
        }

        let shard = &self.shards[self.hasher.hash_one(key) as usize % SHARDS];
        let mut counters = shard.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(window) = counters.get_mut(key) {
            let elapsed = now.saturating_duration_since(window.started);
            if elapsed < self.limit.window {
                if window.count < self.limit.max {
                    window.count += 1;
                    return Decision::Allowed;
                }
                return Decision::Limited {
                    retry_after: self.limit.window - elapsed,
                };
            }
        }

        counters.put(
            key.to_string(),
            Window {
                count: 1,
                started: now,
            },
        );
        Decision::Allowed
    }

    /// Number of keys currently retained.
    pub fn tracked_keys(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

/// All rate-limit policies of the process.
///
/// Built once at startup and shared through `AppState`.
pub struct RateLimiter {
    pub global: Arc<FixedWindow>,
    pub login: Arc<FixedWindow>,
    pub upload: Arc<FixedWindow>,
    pub api_key: Arc<FixedWindow>,
    max_tracked_keys: usize,
    custom: Mutex<HashMap<String, Arc<FixedWindow>>>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let cap = settings.max_tracked_keys;
        Self {
            global: Arc::new(FixedWindow::new("global", "global_", settings.global, cap)),
            login: Arc::new(FixedWindow::new("login", "login_", settings.login, cap)),
            upload: Arc::new(FixedWindow::new("upload", "upload_", settings.upload, cap)),
            api_key: Arc::new(FixedWindow::new("api_key", "apikey_", settings.api_key, cap)),
            max_tracked_keys: cap,
            custom: Mutex::new(HashMap::new()),
        }
    }

    /// A policy with its own prefix and limit.
    ///
    /// Asking twice for the same prefix returns the same counters.
    pub fn custom(&self, prefix: &str, limit: LimitSetting) -> Arc<FixedWindow> {
        let mut custom = self.custom.lock().unwrap_or_else(PoisonError::into_inner);
        custom
            .entry(prefix.to_string())
            .or_insert_with(|| {
                Arc::new(FixedWindow::new(
                    prefix,
                    format!("{prefix}_"),
                    limit,
                    self.max_tracked_keys,
                ))
            })
            .clone()
    }
}
