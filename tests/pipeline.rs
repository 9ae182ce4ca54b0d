// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end tests of the request pipeline.

mod common;

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    routing::{delete, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use common::*;
use hrms_server::{
    api::{self, LOGIN_PATH},
    audit::{AuditAction, AuditStatus},
    auth::{permission_guard, role_guard, Auth, RequirePermission, RequireRole, Role, StaticPermissions},
    config::{LimitSetting, RateLimitSettings},
    db::SessionContext,
    state::AppState,
};

const PEGAWAI_ID: &str = "3f1e9c1c-8c1b-4c44-8d8d-2b0c2f6e0a01";

async fn create_pegawai(Auth(identity): Auth, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({ "created_by": identity.subject, "nama": body["nama"] })),
    )
}

async fn list_pegawai(context: SessionContext) -> Json<Value> {
    Json(json!({
        "user_id": context.user_id(),
        "unit_id": context.unit_id(),
        "role": context.role(),
    }))
}

/// A small HR API shaped like the real one.
fn hr_routes(state: &AppState) -> Router<AppState> {
    let update_salary = RequirePermission::new("kepegawaian.update", state.permissions.clone());

    api::routes()
        .route("/api/v1/pegawai", post(create_pegawai).get(list_pegawai))
        .route(
            "/api/v1/pegawai/{id}",
            delete(|| async { StatusCode::NO_CONTENT })
                .route_layer(from_fn_with_state(RequireRole::new(&[Role::Supervisor]), role_guard)),
        )
        .route(
            "/api/v1/pegawai/{id}/gaji",
            put(|| async { StatusCode::NO_CONTENT })
                .route_layer(from_fn_with_state(update_salary, permission_guard)),
        )
        .route(LOGIN_PATH, post(|| async { "token" }))
        .route(
            "/api/v1/pegawai/{id}/upload-foto",
            post(|| async { StatusCode::CREATED }),
        )
}

fn app() -> TestApp {
    TestApp::build(hr_routes, TestOptions::default())
}

#[tokio::test]
async fn missing_token_is_rejected_with_envelope() {
    let app = app();
    let response = app.send(get("/api/v1/pegawai", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(!request_id.is_empty());

    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_MISSING_TOKEN");
    assert_eq!(body["request_id"], request_id);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn inbound_request_id_is_honoured() {
    let app = app();
    let mut request = get("/api/v1/pegawai", Some("Bearer not-a-jwt"));
    request
        .headers_mut()
        .insert("x-request-id", "trace-abc".parse().unwrap());
    let response = app.send(request).await;

    assert_eq!(response.headers()["x-request-id"], "trace-abc");
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "AUTH_INVALID_TOKEN");
    assert_eq!(body["request_id"], "trace-abc");
}

#[tokio::test]
async fn expired_token_is_distinguished() {
    let app = app();
    let mut expired = claims("user-1", &["staff"], None);
    expired["exp"] = json!(now() - 3600);
    let auth = format!("Bearer {}", sign(PRIMARY_PEM, Some("primary"), &expired));

    let response = app.send(get("/api/v1/pegawai", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], "AUTH_TOKEN_EXPIRED");
}

#[tokio::test]
async fn valid_token_reaches_handler_with_session_context() {
    let app = app();
    let auth = bearer("user-1", &["staff", "offline_access"]);

    let response = app.send(get("/api/v1/pegawai", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "user_id": "user-1", "unit_id": "unit-a", "role": "staff" })
    );
}

#[tokio::test]
async fn whoami_returns_resolved_identity() {
    let app = app();
    let auth = bearer("user-2", &["officer", "staff"]);

    let response = app.send(get("/api/v1/auth/me", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user_id"], "user-2");
    assert_eq!(body["role"], "officer");
    assert_eq!(body["unit_id"], "unit-a");
}

#[tokio::test]
async fn public_paths_need_no_token() {
    let app = app();
    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(get("/api-doc/openapi.json", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn role_gate_rejects_lower_tiers_and_admits_admin() {
    let app = app();
    let uri = format!("/api/v1/pegawai/{PEGAWAI_ID}");

    let staff = bearer("user-1", &["staff"]);
    let response = app
        .send(send_json("DELETE", &uri, Some(&staff), &json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "AUTHZ_ROLE_INSUFFICIENT");

    let supervisor = bearer("user-2", &["supervisor"]);
    let response = app
        .send(send_json("DELETE", &uri, Some(&supervisor), &json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let admin = bearer("root", &["admin"]);
    let response = app
        .send(send_json("DELETE", &uri, Some(&admin), &json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn permission_gate_consults_store() {
    let permissions = StaticPermissions::new().grant(Role::Officer, "kepegawaian.update");
    let app = TestApp::build(
        hr_routes,
        TestOptions {
            permissions: Arc::new(permissions),
            ..TestOptions::default()
        },
    );
    let uri = format!("/api/v1/pegawai/{PEGAWAI_ID}/gaji");
    let body = json!({ "gaji_pokok": 5_500_000 });

    let staff = bearer("user-1", &["staff"]);
    let response = app.send(send_json("PUT", &uri, Some(&staff), &body)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "AUTHZ_FORBIDDEN");

    let officer = bearer("user-2", &["officer"]);
    let response = app.send(send_json("PUT", &uri, Some(&officer), &body)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn mutating_request_is_audited_once_with_redacted_payload() {
    let app = app();
    let auth = bearer("user-1", &["staff"]);
    let body = json!({
        "nama": "Budi",
        "nik": "3201010101010001",
        "email": "budi@example.go.id",
        "keluarga": [{ "nama": "Ani", "nik": "3201010101010002" }]
    });

    let response = app
        .send(send_json("POST", "/api/v1/pegawai", Some(&auth), &body))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();

    let _ = app.send(get("/api/v1/pegawai", Some(&auth))).await;

    let records = app.audit_records().await;
    assert_eq!(records.len(), 1, "GET must not be audited");
    let record = &records[0];
    assert_eq!(record.action, AuditAction::Create);
    assert_eq!(record.status, AuditStatus::Success);
    assert_eq!(record.status_code, 201);
    assert_eq!(record.user_id.as_deref(), Some("user-1"));
    assert_eq!(record.request_id, request_id);
    assert_eq!(record.ip_address, "198.51.100.7");

    let payload = record.payload().unwrap();
    assert_eq!(payload["nama"], "Budi");
    assert_eq!(payload["nik"], "************0001");
    assert_eq!(payload["email"], "b***@example.go.id");
    assert_eq!(payload["keluarga"][0]["nik"], "************0002");
}

#[tokio::test]
async fn rejected_mutation_is_audited_as_failed_without_actor() {
    let app = app();
    let response = app
        .send(send_json("POST", "/api/v1/pegawai", None, &json!({ "nama": "x" })))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let records = app.audit_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Failed);
    assert_eq!(records[0].status_code, 401);
    assert!(records[0].user_id.is_none());
    assert!(records[0].error_message.is_some());
}

#[tokio::test]
async fn global_limit_answers_429_with_retry_after() {
    let app = TestApp::build(
        hr_routes,
        TestOptions {
            rate_limits: RateLimitSettings {
                global: LimitSetting::new(3, 60),
                ..RateLimitSettings::default()
            },
            ..TestOptions::default()
        },
    );

    for _ in 0..3 {
        assert_eq!(app.send(get("/health", None)).await.status(), StatusCode::OK);
    }
    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert!(!body["error"]["message"].as_str().unwrap().contains("global"));
}

#[tokio::test]
async fn login_limit_only_counts_login_path() {
    let app = TestApp::build(
        hr_routes,
        TestOptions {
            rate_limits: RateLimitSettings {
                login: LimitSetting::new(2, 900),
                ..RateLimitSettings::default()
            },
            ..TestOptions::default()
        },
    );

    for _ in 0..2 {
        let response = app.send(send_json("POST", LOGIN_PATH, None, &json!({}))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.send(send_json("POST", LOGIN_PATH, None, &json!({}))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(app.send(get("/health", None)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_limit_is_per_user() {
    let app = TestApp::build(
        hr_routes,
        TestOptions {
            rate_limits: RateLimitSettings {
                upload: LimitSetting::new(1, 60),
                ..RateLimitSettings::default()
            },
            ..TestOptions::default()
        },
    );
    let uri = format!("/api/v1/pegawai/{PEGAWAI_ID}/upload-foto");
    let first = bearer("user-1", &["staff"]);
    let second = bearer("user-2", &["staff"]);

    let response = app.send(send_json("POST", &uri, Some(&first), &json!({}))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = app.send(send_json("POST", &uri, Some(&first), &json!({}))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Same client IP, different user: separate counter.
    let response = app.send(send_json("POST", &uri, Some(&second), &json!({}))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn rotated_key_is_picked_up_on_unknown_kid() {
    let app = app();
    let token = sign(ROTATED_PEM, Some("rotated"), &claims("user-3", &["staff"], None));
    let auth = format!("Bearer {token}");

    let response = app.send(get("/api/v1/auth/me", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.keys.replace(Some(rotated_set()));
    let response = app.send(get("/api/v1/auth/me", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user_id"], "user-3");
}

#[tokio::test]
async fn unreachable_key_set_fails_closed() {
    let app = app();
    app.keys.replace(None);
    let token = sign(ROTATED_PEM, Some("rotated"), &claims("user-3", &["admin"], None));
    let auth = format!("Bearer {token}");

    let response = app.send(get("/api/v1/auth/me", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], "AUTH_KEYSET_UNAVAILABLE");
}

#[tokio::test]
async fn token_signed_by_unknown_key_is_rejected() {
    let app = app();
    // Claims the primary kid but is signed with a different key.
    let token = sign(ROTATED_PEM, Some("primary"), &claims("mallory", &["admin"], None));
    let auth = format!("Bearer {token}");

    let response = app
        .send(send_json("POST", "/api/v1/pegawai", Some(&auth), &json!({ "nama": "x" })))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], "AUTH_INVALID_TOKEN");
}

#[tokio::test]
async fn unmatched_route_still_requires_token() {
    let app = app();
    let response = app.send(get("/api/v1/does-not-exist", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let auth = bearer("user-1", &["staff"]);
    let response = app.send(get("/api/v1/does-not-exist", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
