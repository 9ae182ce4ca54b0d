// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The audit record and the helpers deriving its fields from a request.

use axum::http::Method;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Identity;
use crate::redact;

/// What a mutating request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    /// Only recorded when read auditing is switched on.
    Read,
}

impl AuditAction {
    /// Action for an HTTP method; `None` means the request is not audited.
    pub fn from_method(method: &Method, include_reads: bool) -> Option<Self> {
        match *method {
            Method::POST => Some(AuditAction::Create),
            Method::PUT | Method::PATCH => Some(AuditAction::Update),
            Method::DELETE => Some(AuditAction::Delete),
            Method::GET | Method::HEAD if include_reads => Some(AuditAction::Read),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Read => "read",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
        }
    }
}

/// One audited request. Written once, never updated.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub request_id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub ip_address: String,
    pub user_agent: String,
    pub method: String,
    pub path: String,
    pub status: AuditStatus,
    pub status_code: u16,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
    /// Redacted request body; only settable through [`AuditRecord::with_payload`].
    payload: Option<Value>,
}

impl AuditRecord {
    /// Start a record for `method path`. The resource is derived from the path.
    pub fn new(action: AuditAction, method: &Method, path: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: String::new(),
            user_id: None,
            username: None,
            action,
            resource_type: resource_type(path),
            resource_id: resource_id(path),
            ip_address: String::new(),
            user_agent: String::new(),
            method: method.as_str().to_string(),
            path: path.to_string(),
            status: AuditStatus::Success,
            status_code: 0,
            error_message: None,
            duration_ms: 0,
            created_at: Utc::now(),
            payload: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_client(mut self, ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self.user_agent = user_agent.into();
        self
    }

    /// Set the actor.
    pub fn with_actor(mut self, identity: &Identity) -> Self {
        self.user_id = Some(identity.subject.clone());
        self.username = Some(identity.username.clone()).filter(|u| !u.is_empty());
        self
    }

    /// Attach the request body, redacted with the standard rule set.
    pub fn with_payload(mut self, body: &Value) -> Self {
        self.payload = Some(redact::redact(body));
        self
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Record the outcome: failed on status ≥ 400 or a reported error.
    pub fn completed(mut self, status_code: u16, duration_ms: u64, error: Option<String>) -> Self {
        self.status_code = status_code;
        self.duration_ms = duration_ms;
        self.status = if status_code >= 400 || error.is_some() {
            AuditStatus::Failed
        } else {
            AuditStatus::Success
        };
        self.error_message = error;
        self
    }

    /// Structured blob stored in the `changes` column.
    pub fn changes(&self) -> Value {
        json!({
            "request_id": self.request_id,
            "method": self.method,
            "path": self.path,
            "status_code": self.status_code,
            "duration_ms": self.duration_ms,
            "request_body": self.payload,
        })
    }
}

fn is_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// First meaningful path segment, skipping `api` and version segments.
pub fn resource_type(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .find(|s| *s != "api" && !is_version_segment(s))
        .unwrap_or("unknown")
        .to_string()
}

/// Last path segment that parses as a UUID.
pub fn resource_id(path: &str) -> Option<Uuid> {
    path.split('/')
        .rev()
        .find_map(|segment| Uuid::parse_str(segment).ok())
}
