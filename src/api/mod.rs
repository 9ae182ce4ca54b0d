// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Router assembly.
//!
//! Every route runs through the same pipeline, outermost first:
//!
//! | Layer | Effect |
//! |-------|--------|
//! | request id | honour or generate `x-request-id`, echo it back |
//! | trace | one span per request |
//! | [`stamp_request_id`] | request id in error envelopes |
//! | [`audit`] | one record per mutating request |
//! | global limit | per client IP |
//! | login limit | per client IP, login path only |
//! | [`authenticate`] | identity + session context |
//! | upload limit | per user, upload paths only |
//!
//! Route-specific gates ([`role_guard`](crate::auth::role_guard),
//! [`permission_guard`](crate::auth::permission_guard)) are added with
//! `route_layer` by whoever registers the route, and therefore run after
//! authentication.

use axum::{
    extract::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    audit::{audit, AuditLayer},
    auth::{authenticate, Identity, Role},
    error::{stamp_request_id, ErrorEnvelope, REQUEST_ID_HEADER},
    ratelimit::{rate_limit, RateLimitGuard},
    state::AppState,
};

pub mod health;
pub mod users;

/// Login path, throttled by the login policy.
pub const LOGIN_PATH: &str = "/api/v1/auth/login";

pub fn is_login_path(path: &str) -> bool {
    path.strip_prefix(LOGIN_PATH)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Upload endpoints end in an `upload` or `upload-*` segment.
pub fn is_upload_path(path: &str) -> bool {
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .is_some_and(|last| last == "upload" || last.starts_with("upload-"))
}

/// Built-in routes, for services that add their own before wrapping.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api/v1/auth/me", get(users::get_current_user))
}

/// The service router: built-in routes plus docs, inside the pipeline.
pub fn router(state: AppState) -> Router {
    pipeline(routes(), state)
}

/// Wrap `routes` in the request pipeline and attach the API docs.
pub fn pipeline(routes: Router<AppState>, state: AppState) -> Router {
    let trust_proxy = state.trust_proxy_headers;
    let global = RateLimitGuard::client_ip(state.limiter.global.clone(), trust_proxy);
    let login = RateLimitGuard::client_ip(state.limiter.login.clone(), trust_proxy).scoped(is_login_path);
    let upload = RateLimitGuard::user_or_ip(state.limiter.upload.clone(), trust_proxy).scoped(is_upload_path);
    let audit_layer = AuditLayer::new(state.audit.clone(), trust_proxy);

    routes
        .with_state(state.clone())
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(from_fn_with_state(upload, rate_limit))
        .layer(from_fn_with_state(state.verifier.clone(), authenticate))
        .layer(from_fn_with_state(login, rate_limit))
        .layer(from_fn_with_state(global, rate_limit))
        .layer(from_fn_with_state(audit_layer, audit))
        .layer(from_fn(stamp_request_id))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id,
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        users::get_current_user
    ),
    components(
        schemas(
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            users::UserMeResponse,
            Identity,
            Role,
            ErrorEnvelope
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Users", description = "The authenticated caller")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_path_matches_whole_segments() {
        assert!(is_login_path("/api/v1/auth/login"));
        assert!(is_login_path("/api/v1/auth/login/"));
        assert!(!is_login_path("/api/v1/auth/loginx"));
        assert!(!is_login_path("/api/v1/auth/me"));
    }

    #[test]
    fn upload_paths_are_recognised() {
        assert!(is_upload_path("/api/v1/kepegawaian/pegawai/42/upload-foto"));
        assert!(is_upload_path("/api/v1/dokumen/upload"));
        assert!(!is_upload_path("/api/v1/uploads"));
        assert!(!is_upload_path("/api/v1/pegawai"));
    }

    #[test]
    fn openapi_lists_builtin_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/api/v1/auth/me"));
    }
}
