// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Refresh Model
//!
//! - Keys are fetched lazily on first use and then kept until a token names
//!   a `kid` the cache does not know
//! - An unknown `kid` forces one refresh. Concurrent misses share that
//!   refresh (single-flight), and forced refreshes are spaced by
//!   `min_refresh_interval`
//! - A failed fetch never falls back to unverified decoding: the caller gets
//!   [`AuthError::KeySetUnavailable`]

use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::error::AuthError;

/// Timeout for a single key-set request.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a key-set source.
#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    #[error("key set request failed: {0}")]
    Transport(String),

    #[error("HTTP {0} from key set endpoint")]
    Status(u16),

    #[error("malformed key set: {0}")]
    Malformed(String),

    #[error("key set fetch suppressed after a recent failure")]
    Backoff,
}

/// Where signing keys come from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, KeySetError>;
}

/// Fetches the key set from the identity provider over HTTPS.
pub struct HttpKeySetSource {
    url: String,
    client: reqwest::Client,
}

impl HttpKeySetSource {
    pub fn new(url: impl Into<String>) -> Result<Self, KeySetError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| KeySetError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| KeySetError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeySetError::Status(response.status().as_u16()));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| KeySetError::Malformed(e.to_string()))
    }
}

/// A key set held in memory and swappable at runtime.
///
/// Used for local tooling and to simulate key rotation in tests.
#[derive(Default)]
pub struct StaticKeySetSource {
    keys: StdRwLock<Option<JwkSet>>,
    fetches: std::sync::atomic::AtomicUsize,
}

impl StaticKeySetSource {
    pub fn new(keys: JwkSet) -> Self {
        Self {
            keys: StdRwLock::new(Some(keys)),
            fetches: Default::default(),
        }
    }

    /// A source whose every fetch fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Replace the served key set (`None` makes fetches fail).
    pub fn replace(&self, keys: Option<JwkSet>) {
        if let Ok(mut guard) = self.keys.write() {
            *guard = keys;
        }
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        self.fetches
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.keys
            .read()
            .map_err(|_| KeySetError::Transport("key set lock poisoned".into()))?
            .clone()
            .ok_or_else(|| KeySetError::Transport("identity provider unreachable".into()))
    }
}

/// A usable verification key.
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: Option<String>,
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

/// Snapshot of the key set.
pub struct CachedKeys {
    pub keys: Vec<VerificationKey>,
    pub fetched_at: Instant,
}

impl CachedKeys {
    fn find(&self, kid: &str) -> Option<VerificationKey> {
        self.keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid))
            .cloned()
    }
}

/// JWKS manager with caching and single-flight refresh.
pub struct JwksManager {
    source: Arc<dyn KeySetSource>,
    min_refresh_interval: Duration,
    cache: RwLock<Option<Arc<CachedKeys>>>,
    /// Held for the duration of a fetch; stores the time of the last attempt.
    refresh_lock: Mutex<Option<Instant>>,
}

impl JwksManager {
    pub fn new(source: Arc<dyn KeySetSource>, min_refresh_interval: Duration) -> Self {
        Self {
            source,
            min_refresh_interval,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(None),
        }
    }

    /// Current snapshot, fetching it if nothing is cached yet.
    pub async fn keys(&self) -> Result<Arc<CachedKeys>, AuthError> {
        if let Some(current) = self.cache.read().await.clone() {
            return Ok(current);
        }
        self.refresh_after(None).await
    }

    /// Key for the given `kid`, forcing one refresh on a miss.
    pub async fn key_for(&self, kid: &str) -> Result<VerificationKey, AuthError> {
        let snapshot = self.keys().await?;
        if let Some(key) = snapshot.find(kid) {
            return Ok(key);
        }

        tracing::debug!(kid, "unknown key id, refreshing key set");
        let refreshed = self.refresh_after(Some(snapshot.fetched_at)).await?;
        refreshed.find(kid).ok_or(AuthError::InvalidToken)
    }

    /// Force a refresh regardless of spacing (startup warm-up, readiness).
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let mut last_attempt = self.refresh_lock.lock().await;
        self.fetch_locked(&mut last_attempt).await.map(|_| ())
    }

    /// Whether a key set has been fetched at least once.
    pub async fn is_cached(&self) -> bool {
        self.cache.read().await.is_some()
    }

    /// Refresh unless someone else already replaced the snapshot the caller
    /// saw, or the last attempt is too recent.
    async fn refresh_after(&self, seen: Option<Instant>) -> Result<Arc<CachedKeys>, AuthError> {
        let mut last_attempt = self.refresh_lock.lock().await;

        let current = self.cache.read().await.clone();
        if let Some(current) = &current {
            if Some(current.fetched_at) != seen {
                return Ok(current.clone());
            }
        }

        if let Some(at) = *last_attempt {
            if at.elapsed() < self.min_refresh_interval {
                return match current {
                    Some(current) => Ok(current),
                    None => Err(AuthError::KeySetUnavailable(KeySetError::Backoff.to_string())),
                };
            }
        }

        self.fetch_locked(&mut last_attempt).await
    }

    async fn fetch_locked(
        &self,
        last_attempt: &mut Option<Instant>,
    ) -> Result<Arc<CachedKeys>, AuthError> {
        *last_attempt = Some(Instant::now());

        let set = self.source.fetch().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to fetch identity provider key set");
            AuthError::KeySetUnavailable(e.to_string())
        })?;

        let keys: Vec<VerificationKey> = set.keys.iter().filter_map(verification_key).collect();
        tracing::info!(keys = keys.len(), "identity provider key set loaded");

        let entry = Arc::new(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        *self.cache.write().await = Some(entry.clone());
        Ok(entry)
    }
}

/// Convert a JWK to a verification key, skipping encryption and
/// unsupported keys.
fn verification_key(jwk: &Jwk) -> Option<VerificationKey> {
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return None;
    }

    let converted = match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                Some(KeyAlgorithm::PS256) => Algorithm::PS256,
                _ => Algorithm::RS256,
            };
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map(|key| (key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };
            DecodingKey::from_ec_components(&ec.x, &ec.y).map(|key| (key, alg))
        }
        _ => {
            tracing::debug!(kid = ?jwk.common.key_id, "skipping unsupported key type");
            return None;
        }
    };

    match converted {
        Ok((key, algorithm)) => Some(VerificationKey {
            kid: jwk.common.key_id.clone(),
            key,
            algorithm,
        }),
        Err(e) => {
            tracing::warn!(kid = ?jwk.common.key_id, error = %e, "skipping unusable key");
            None
        }
    }
}
