// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit middleware.
//!
//! Sits outside authentication so that rejected requests (401/403/429) are
//! audited as well. The caller's identity is learned through an
//! [`IdentityCell`] that the authentication middleware fills.

use std::time::Instant;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use super::record::{AuditAction, AuditRecord};
use super::recorder::AuditRecorder;
use crate::auth::IdentityCell;
use crate::error::{ApiError, ErrorCode, ErrorReport, REQUEST_ID_HEADER};
use crate::ratelimit::client_ip;

/// Largest request body captured into an audit record.
pub const MAX_CAPTURED_BODY: usize = 1024 * 1024;

/// Status recorded for requests the client abandoned.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Path prefixes never audited.
const SKIP_PATHS: &[&str] = &["/health", "/metrics", "/favicon.ico", "/docs", "/api-doc"];

/// State for the [`audit`] middleware.
#[derive(Clone)]
pub struct AuditLayer {
    recorder: AuditRecorder,
    trust_proxy_headers: bool,
}

impl AuditLayer {
    pub fn new(recorder: AuditRecorder, trust_proxy_headers: bool) -> Self {
        Self {
            recorder,
            trust_proxy_headers,
        }
    }
}

pub fn is_skipped(path: &str) -> bool {
    SKIP_PATHS.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Audit middleware function, for `from_fn_with_state`.
pub async fn audit(State(layer): State<AuditLayer>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if is_skipped(&path) {
        return next.run(request).await;
    }
    let Some(action) = AuditAction::from_method(request.method(), layer.recorder.include_reads())
    else {
        return next.run(request).await;
    };

    let started = Instant::now();
    let headers = request.headers();
    let request_id = header_str(headers.get(REQUEST_ID_HEADER));
    let user_agent = header_str(headers.get(USER_AGENT));
    let record = AuditRecord::new(action, request.method(), &path)
        .with_request_id(request_id)
        .with_client(client_ip(&request, layer.trust_proxy_headers), user_agent);

    let cell = IdentityCell::new();
    let mut pending = PendingRecord {
        recorder: layer.recorder.clone(),
        record: Some(record),
        cell: cell.clone(),
        started,
    };

    let mut request = match capture_body(request).await {
        Ok((request, payload)) => {
            if let Some(payload) = payload {
                pending.attach(&payload);
            }
            request
        }
        Err(e) => {
            let response = e.into_response();
            pending.finish(&response);
            return response;
        }
    };
    request.extensions_mut().insert(cell);

    let response = next.run(request).await;
    pending.finish(&response);
    response
}

fn header_str(value: Option<&axum::http::HeaderValue>) -> String {
    value
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Buffer a JSON body of bounded size and hand back an equivalent request.
///
/// Bodies that are not JSON, are empty, or declare a length over the limit are
/// left untouched. A body of unknown length (chunked) is buffered up to the
/// limit and rejected with 413 beyond it. A body that is not a JSON object
/// yields no payload.
async fn capture_body(request: Request) -> Result<(Request, Option<Value>), ApiError> {
    let headers = request.headers();
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    if !is_json {
        return Ok((request, None));
    }
    let length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if matches!(length, Some(0)) || length.is_some_and(|len| len > MAX_CAPTURED_BODY) {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_CAPTURED_BODY).await.map_err(|e| {
        tracing::debug!(error = %e, "failed to read request body");
        if length.is_none() {
            ApiError::new(ErrorCode::ValPayloadTooLarge, "Request body too large")
        } else {
            ApiError::bad_request("Invalid request body")
        }
    })?;

    let payload = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .filter(Value::is_object);

    Ok((Request::from_parts(parts, Body::from(bytes)), payload))
}

/// A record waiting for its request to finish.
///
/// Dropping it unfinished (the request future was cancelled) still emits a
/// failed record.
struct PendingRecord {
    recorder: AuditRecorder,
    record: Option<AuditRecord>,
    cell: IdentityCell,
    started: Instant,
}

impl PendingRecord {
    fn attach(&mut self, payload: &Value) {
        self.record = self.record.take().map(|r| r.with_payload(payload));
    }

    fn finish(&mut self, response: &Response) {
        let error = response
            .extensions()
            .get::<ErrorReport>()
            .map(|report| report.message.clone());
        self.submit(response.status().as_u16(), error);
    }

    fn submit(&mut self, status_code: u16, error: Option<String>) {
        let Some(mut record) = self.record.take() else {
            return;
        };
        if let Some(identity) = self.cell.get() {
            record = record.with_actor(identity);
        }
        let duration_ms = self.started.elapsed().as_millis() as u64;
        self.recorder
            .record(record.completed(status_code, duration_ms, error));
    }
}

impl Drop for PendingRecord {
    fn drop(&mut self) {
        if self.record.is_some() {
            self.submit(CLIENT_CLOSED_REQUEST, Some("request cancelled".to_string()));
        }
    }
}
