//! Sub-APIs reachable through the encrypted channel.
//!
//! The channel decrypts a request, hands the JSON payload to the sub-API
//! named in the path and encrypts whatever comes back. Sub-APIs report
//! their own failures as `{"status": "error", "message": ...}` payloads;
//! only an unknown sub-API changes the HTTP status.

pub mod auth;
pub mod data;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Value};

use portico_core::{SessionId, UserId};

pub use auth::AuthApi;
pub use data::DataApi;

/// Who is calling, as established by the channel.
#[derive(Debug, Clone)]
pub struct Caller {
    pub session_id: SessionId,
    /// Set only while the session is logged in.
    pub user_id: Option<UserId>,
}

/// A named endpoint behind `/api/<name>`.
#[async_trait]
pub trait SubApi: Send + Sync {
    /// Handle one decrypted request. Never fails; errors are payloads.
    async fn handle(&self, request: Value, caller: &Caller) -> Value;
}

/// `{"status": "error", "message": <message>}`.
pub fn error_payload(message: impl Into<String>) -> Value {
    json!({ "status": "error", "message": message.into() })
}

/// Dispatch table from sub-API name to handler.
#[derive(Default, Clone)]
pub struct ApiDispatcher {
    apis: BTreeMap<String, Arc<dyn SubApi>>,
}

impl ApiDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a sub-API.
    pub fn with(mut self, name: &str, api: Arc<dyn SubApi>) -> Self {
        self.apis.insert(name.to_string(), api);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.apis.keys().map(String::as_str)
    }

    /// Route a request to the named sub-API.
    pub async fn dispatch(&self, name: &str, request: Value, caller: &Caller) -> (StatusCode, Value) {
        match self.apis.get(name) {
            Some(api) => {
                tracing::debug!(api = name, session = caller.session_id.short(), "api dispatch");
                (StatusCode::OK, api.handle(request, caller).await)
            }
            None => {
                tracing::debug!(api = name, "unknown api");
                (StatusCode::NOT_FOUND, json!({ "error": "unknown_api" }))
            }
        }
    }
}
