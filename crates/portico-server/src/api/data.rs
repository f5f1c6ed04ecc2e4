//! The `data` sub-API: calls portal functions by name.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use portico_core::UserId;
use portico_store::Store;

use crate::assets::FileRegistry;
use crate::context::RequestContext;
use crate::registry::{FunctionKind, FunctionRegistry};

use super::{error_payload, Caller, SubApi};

/// Portal function invocation, shared by the channel and page recipes.
#[derive(Clone)]
pub struct DataApi {
    store: Arc<dyn Store>,
    functions: Arc<FunctionRegistry>,
    files: Arc<FileRegistry>,
    base_url: String,
}

impl DataApi {
    pub fn new(
        store: Arc<dyn Store>,
        functions: Arc<FunctionRegistry>,
        files: Arc<FileRegistry>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            functions,
            files,
            base_url: base_url.into(),
        }
    }

    /// Call portal function `name` on behalf of `user_id`.
    ///
    /// Returns `{"status": "success", "result": ..}` or
    /// `{"status": "error", "message": ..}`.
    pub async fn call(&self, name: &str, args: Value, user_id: Option<UserId>) -> Value {
        let Some(function) = self.functions.get(FunctionKind::Portal, name) else {
            tracing::debug!(function = name, "unknown portal function");
            return error_payload(format!("Unknown portal function: {}", name));
        };

        let profile = match user_id {
            Some(id) => self.store.get_profile(id).await.unwrap_or_else(|e| {
                tracing::warn!(user_id = id, error = %e, "profile lookup failed");
                None
            }),
            None => None,
        };

        let ctx = RequestContext::new(args, self.files.clone(), self.base_url.clone())
            .with_user(user_id, profile.as_ref())
            .with_plugin(&function.plugin);

        match (function.callback)(ctx).await {
            Ok(result) => json!({ "status": "success", "result": result }),
            Err(e) => {
                tracing::debug!(function = name, plugin = %function.plugin, error = %e, "portal function failed");
                error_payload(e.to_string())
            }
        }
    }
}

#[async_trait]
impl SubApi for DataApi {
    async fn handle(&self, request: Value, caller: &Caller) -> Value {
        let Some(name) = request.get("name").and_then(Value::as_str) else {
            return error_payload("Function name required.");
        };
        let args = request.get("args").cloned().unwrap_or_else(|| json!({}));
        self.call(name, args, caller.user_id).await
    }
}
