// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values, and the
//! typed [`AppConfig`] assembled from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `3003` |
//! | `DATABASE_URL` | Postgres URL for the RLS-enforcing database | Required |
//! | `DATABASE_MAX_CONNECTIONS` | Connection pool size | `25` |
//! | `IDP_JWKS_URL` | Identity provider JWKS endpoint | Required |
//! | `IDP_ISSUER` | Expected JWT issuer claim | Optional |
//! | `IDP_AUDIENCE` | Expected JWT audience claim | Optional |
//! | `JWKS_MIN_REFRESH_SECS` | Minimum spacing of forced key-set refreshes | `10` |
//! | `RATE_LIMIT_*_MAX` / `RATE_LIMIT_*_WINDOW_SECS` | Rate-limit policies | see [`RateLimitSettings`] |
//! | `RATE_LIMIT_MAX_TRACKED_KEYS` | Retained counters per policy | `100000` |
//! | `TRUST_PROXY_HEADERS` | Take client IP from `X-Forwarded-For` / `X-Real-IP` | `false` |
//! | `AUDIT_QUEUE_CAPACITY` | Bounded audit queue length | `1024` |
//! | `AUDIT_WORKERS` | Audit persistence workers | `4` |
//! | `AUDIT_PERSIST_TIMEOUT_SECS` | Per-record persistence timeout | `5` |
//! | `AUDIT_READ_METHODS` | Also audit GET/HEAD | `false` |
//! | `PERMISSION_POLICY` | `database` or `allow-all` | `database` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files for HTTPS | Plain HTTP |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::time::Duration;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS_ENV: &str = "DATABASE_MAX_CONNECTIONS";

/// Identity provider JWKS endpoint (e.g. Keycloak
/// `/realms/<realm>/protocol/openid-connect/certs`).
pub const IDP_JWKS_URL_ENV: &str = "IDP_JWKS_URL";
pub const IDP_ISSUER_ENV: &str = "IDP_ISSUER";
pub const IDP_AUDIENCE_ENV: &str = "IDP_AUDIENCE";
pub const JWKS_MIN_REFRESH_SECS_ENV: &str = "JWKS_MIN_REFRESH_SECS";

pub const RATE_LIMIT_MAX_TRACKED_KEYS_ENV: &str = "RATE_LIMIT_MAX_TRACKED_KEYS";

/// Only enable behind a reverse proxy that overwrites these headers.
pub const TRUST_PROXY_HEADERS_ENV: &str = "TRUST_PROXY_HEADERS";

pub const AUDIT_QUEUE_CAPACITY_ENV: &str = "AUDIT_QUEUE_CAPACITY";
pub const AUDIT_WORKERS_ENV: &str = "AUDIT_WORKERS";
pub const AUDIT_PERSIST_TIMEOUT_SECS_ENV: &str = "AUDIT_PERSIST_TIMEOUT_SECS";
pub const AUDIT_READ_METHODS_ENV: &str = "AUDIT_READ_METHODS";

pub const PERMISSION_POLICY_ENV: &str = "PERMISSION_POLICY";

pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Configuration errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: String, value: String },
}

/// How the Authorization Gate answers permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Consult the database permission tables (deny when absent).
    Database,
    /// Grant every permission. Temporary policy, logged at startup and on
    /// every grant.
    AllowAll,
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// A single fixed-window limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSetting {
    pub max: u32,
    pub window: Duration,
}

impl LimitSetting {
    pub const fn new(max: u32, window_secs: u64) -> Self {
        Self {
            max,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Limits for every rate-limit policy the pipeline installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub global: LimitSetting,
    pub login: LimitSetting,
    pub upload: LimitSetting,
    pub api_key: LimitSetting,
    pub max_tracked_keys: usize,
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global: LimitSetting::new(100, 60),
            login: LimitSetting::new(5, 15 * 60),
            upload: LimitSetting::new(10, 60),
            api_key: LimitSetting::new(1000, 60),
            max_tracked_keys: 100_000,
            trust_proxy_headers: false,
        }
    }
}

/// Audit recorder tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    pub queue_capacity: usize,
    pub workers: usize,
    pub persist_timeout: Duration,
    pub include_reads: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers: 4,
            persist_timeout: Duration::from_secs(5),
            include_reads: false,
        }
    }
}

/// Identity provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProviderSettings {
    pub jwks_url: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub min_refresh_interval: Duration,
}

/// Typed application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub idp: IdentityProviderSettings,
    pub rate_limits: RateLimitSettings,
    pub audit: AuditSettings,
    pub permission_policy: PermissionPolicy,
    pub tls: Option<(String, String)>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let defaults = RateLimitSettings::default();
        let rate_limits = RateLimitSettings {
            global: limit(&get, "GLOBAL", defaults.global)?,
            login: limit(&get, "LOGIN", defaults.login)?,
            upload: limit(&get, "UPLOAD", defaults.upload)?,
            api_key: limit(&get, "API_KEY", defaults.api_key)?,
            max_tracked_keys: parse_or(
                &get,
                RATE_LIMIT_MAX_TRACKED_KEYS_ENV,
                defaults.max_tracked_keys,
            )?,
            trust_proxy_headers: parse_or(
                &get,
                TRUST_PROXY_HEADERS_ENV,
                defaults.trust_proxy_headers,
            )?,
        };

        let audit_defaults = AuditSettings::default();
        let audit = AuditSettings {
            queue_capacity: parse_or(&get, AUDIT_QUEUE_CAPACITY_ENV, audit_defaults.queue_capacity)?,
            workers: parse_or(&get, AUDIT_WORKERS_ENV, audit_defaults.workers)?,
            persist_timeout: Duration::from_secs(parse_or(
                &get,
                AUDIT_PERSIST_TIMEOUT_SECS_ENV,
                audit_defaults.persist_timeout.as_secs(),
            )?),
            include_reads: parse_or(&get, AUDIT_READ_METHODS_ENV, audit_defaults.include_reads)?,
        };

        let permission_policy = match get(PERMISSION_POLICY_ENV).as_deref() {
            None | Some("database") => PermissionPolicy::Database,
            Some("allow-all") => PermissionPolicy::AllowAll,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: PERMISSION_POLICY_ENV.to_string(),
                    value: other.to_string(),
                })
            }
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, PORT_ENV, 3003)?,
            database_url: get(DATABASE_URL_ENV).ok_or(ConfigError::Missing(DATABASE_URL_ENV))?,
            database_max_connections: parse_or(&get, DATABASE_MAX_CONNECTIONS_ENV, 25)?,
            idp: IdentityProviderSettings {
                jwks_url: get(IDP_JWKS_URL_ENV).ok_or(ConfigError::Missing(IDP_JWKS_URL_ENV))?,
                issuer: get(IDP_ISSUER_ENV),
                audience: get(IDP_AUDIENCE_ENV),
                min_refresh_interval: Duration::from_secs(parse_or(
                    &get,
                    JWKS_MIN_REFRESH_SECS_ENV,
                    10,
                )?),
            },
            rate_limits,
            audit,
            permission_policy,
            tls,
            log_format,
        })
    }
}

fn parse_or<G, T>(get: &G, name: &str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: name.to_string(),
                value: raw,
            }),
    }
}

fn limit<G>(get: &G, policy: &str, default: LimitSetting) -> Result<LimitSetting, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let max_name = format!("RATE_LIMIT_{policy}_MAX");
    let window_name = format!("RATE_LIMIT_{policy}_WINDOW_SECS");

    Ok(LimitSetting {
        max: parse_or(get, &max_name, default.max)?,
        window: Duration::from_secs(parse_or(get, &window_name, default.window.as_secs())?),
    })
}
