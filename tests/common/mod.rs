// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::{connect_info::MockConnectInfo, Request},
    response::Response,
    Router,
};
use jsonwebtoken::{encode, jwk::JwkSet, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use hrms_server::{
    api::pipeline,
    audit::{AuditError, AuditRecord, AuditRecorder, AuditStore, AuditWorkers},
    auth::{IdentityVerifier, JwksManager, PermissionStore, StaticKeySetSource, StaticPermissions},
    config::{AuditSettings, RateLimitSettings},
    ratelimit::RateLimiter,
    state::AppState,
};

pub const PRIMARY_PEM: &[u8] = include_bytes!("../fixtures/idp_primary.pem");
pub const ROTATED_PEM: &[u8] = include_bytes!("../fixtures/idp_rotated.pem");

const PRIMARY_N: &str = "nzI-B58bsE6ao-B7j3EVM9rmFmVfXzAcpfxKGrcFKe4e892_KwhpfyxxP8yqOFesqYUTCIqFr5CcgtOjZvrXZ7S4STajgn6zOJ8x55n4OCaBBbZUuiFqheHZFNosPhFPZVUFrmJaL3cu_yXsPoEX2DyCdmFNElkPq2B4374qIEPkLhvG3j812o6QsiZ-n9UdGw5pDL1-FiWX-hp0UPQUA9aPmthOVhFT7bQg57TzHyW4rT8aY5vw5QJ25dma8pKrnns1on6QOSTWBlvM_-w3fQ0ki6J4f94sXr2XbL8IlpEd0sCwQFVaqzzPc_SqcpD-HTiBqbBmTh2uPtMZsoTAtw";
const ROTATED_N: &str = "km3t1qRx3NQZbvpnE44jb2OS9BNyH_WKxwGXohRWqZ_9oLmz1Nk8GtFfC4tFDAgBv3GB8S92wbL1dKtMxFazaJVxSv-MJYBsYuJ0Hkq84oyD4IMRgdeIMCESiUnsLRJHiKETAxWaBpJQpZc6tlNplXeoI4cXonKDYd7vBEfwV3pwfZWgbgWbkeQ_pa6KTV_nxBt7teuUIj64pR1AHuQvIypRttwG7OrFoxRtGRwcA-Q5hLSe5QOFFTzp5LKceQLCm8arLmFaBH9qkYTKQXq2luWMZaNKZon8vR2f2_WZxmOjUkK9Erucq3EvF2zijlf5AAkJMbdve_KOio3SNKORgw";

pub const CLIENT_ADDR: &str = "198.51.100.7:51000";

fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({ "kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": n, "e": "AQAB" })
}

pub fn primary_set() -> JwkSet {
    serde_json::from_value(json!({ "keys": [rsa_jwk("primary", PRIMARY_N)] })).unwrap()
}

/// Key set after the identity provider rotated in a new key.
pub fn rotated_set() -> JwkSet {
    serde_json::from_value(json!({
        "keys": [rsa_jwk("primary", PRIMARY_N), rsa_jwk("rotated", ROTATED_N)]
    }))
    .unwrap()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims for a user holding `roles`, optionally tied to a unit.
pub fn claims(sub: &str, roles: &[&str], unit: Option<&str>) -> Value {
    let mut claims = json!({
        "sub": sub,
        "exp": now() + 3600,
        "preferred_username": sub,
        "email": format!("{sub}@example.go.id"),
        "name": sub,
        "realm_access": { "roles": roles },
    });
    if let Some(unit) = unit {
        claims["unit_kerja_id"] = json!(unit);
    }
    claims
}

pub fn sign(pem: &[u8], kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

/// Bearer header for a primary-key token.
pub fn bearer(sub: &str, roles: &[&str]) -> String {
    format!(
        "Bearer {}",
        sign(PRIMARY_PEM, Some("primary"), &claims(sub, roles, Some("unit-a")))
    )
}

/// Audit store that keeps records in memory.
#[derive(Default)]
pub struct RecordingAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditStore {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditStore for RecordingAuditStore {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Knobs for [`TestApp::build`].
pub struct TestOptions {
    pub rate_limits: RateLimitSettings,
    pub audit: AuditSettings,
    pub permissions: Arc<dyn PermissionStore>,
    pub min_refresh_interval: Duration,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitSettings::default(),
            audit: AuditSettings::default(),
            permissions: Arc::new(StaticPermissions::new()),
            min_refresh_interval: Duration::ZERO,
        }
    }
}

/// The full pipeline around test routes, with in-memory collaborators.
pub struct TestApp {
    pub router: Router,
    pub keys: Arc<StaticKeySetSource>,
    pub store: Arc<RecordingAuditStore>,
    shutdown: CancellationToken,
    workers: AuditWorkers,
}

impl TestApp {
    pub fn build(routes: impl FnOnce(&AppState) -> Router<AppState>, options: TestOptions) -> Self {
        let keys = Arc::new(StaticKeySetSource::new(primary_set()));
        let verifier = IdentityVerifier::new(Arc::new(JwksManager::new(
            keys.clone(),
            options.min_refresh_interval,
        )));

        let store = Arc::new(RecordingAuditStore::default());
        let shutdown = CancellationToken::new();
        let (recorder, workers) = AuditRecorder::start(store.clone(), &options.audit, shutdown.clone());

        let state = AppState::new(
            verifier,
            options.permissions,
            Arc::new(RateLimiter::new(&options.rate_limits)),
            recorder,
        );
        let addr: SocketAddr = CLIENT_ADDR.parse().unwrap();
        let router = pipeline(routes(&state), state).layer(MockConnectInfo(addr));

        Self {
            router,
            keys,
            store,
            shutdown,
            workers,
        }
    }

    pub async fn send(&self, request: Request) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Stop the audit workers and return everything they persisted.
    pub async fn audit_records(self) -> Vec<AuditRecord> {
        drop(self.router);
        self.shutdown.cancel();
        self.workers.join().await;
        self.store.records()
    }
}

pub fn get(uri: &str, auth: Option<&str>) -> Request {
    let mut builder = Request::builder().uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn send_json(method: &str, uri: &str, auth: Option<&str>, body: &Value) -> Request {
    let body = body.to_string();
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("content-length", body.len());
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
