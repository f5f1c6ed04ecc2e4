//! Context handed to plugin callbacks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use portico_core::UserId;
use portico_store::Profile;

use crate::assets::FileRegistry;
use crate::error::{Result, ServerError};

/// Default lifetime of a file created through [`RequestContext::make_file`].
pub const DEFAULT_FILE_TTL: Duration = Duration::from_secs(3600);

/// Links to a hosted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLinks {
    pub view: String,
    pub download: String,
}

/// What a portal function, background function or hook sees.
///
/// `args` carries the call arguments for functions and the event payload
/// for hooks. `user` is the caller's profile as JSON, or `{}` when the
/// caller is anonymous or has no profile.
#[derive(Debug, Clone)]
pub struct RequestContext {
    args: Value,
    user_id: Option<UserId>,
    user: Value,
    plugin: Option<String>,
    files: Option<Arc<FileRegistry>>,
    base_url: String,
}

impl RequestContext {
    pub fn new(args: Value, files: Arc<FileRegistry>, base_url: impl Into<String>) -> Self {
        Self {
            args,
            user_id: None,
            user: json!({}),
            plugin: None,
            files: Some(files),
            base_url: base_url.into(),
        }
    }

    /// A context without file hosting, for callers outside a running server.
    pub fn detached(args: Value) -> Self {
        Self {
            args,
            user_id: None,
            user: json!({}),
            plugin: None,
            files: None,
            base_url: String::new(),
        }
    }

    /// Attach the calling user.
    pub fn with_user(mut self, user_id: Option<UserId>, profile: Option<&Profile>) -> Self {
        self.user_id = user_id;
        self.user = profile
            .and_then(|p| serde_json::to_value(p).ok())
            .unwrap_or_else(|| json!({}));
        self
    }

    /// Mark the plugin the callback belongs to.
    pub fn with_plugin(mut self, plugin: &str) -> Self {
        self.plugin = Some(plugin.to_string());
        self
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    /// One named argument.
    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    pub fn user(&self) -> &Value {
        &self.user
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// `{"plugin": <name>}`, with `"Unknown"` outside a plugin.
    pub fn meta(&self) -> Value {
        json!({ "plugin": self.plugin.as_deref().unwrap_or("Unknown") })
    }

    fn files(&self) -> Result<&FileRegistry> {
        self.files
            .as_deref()
            .ok_or_else(|| ServerError::Config("file hosting is not available here".into()))
    }

    /// Reserve a cache file. Write to the returned path, then call
    /// [`RequestContext::host_file`] to expose it.
    pub fn make_file(&self, file_name: &str, ttl: Duration) -> Result<(String, PathBuf)> {
        let plugin = self.plugin.as_deref().unwrap_or("Unknown");
        self.files()?.create(plugin, file_name, ttl)
    }

    /// Expose a cached file and return its view and download links.
    pub fn host_file(&self, file_id: &str, rename: Option<&str>) -> Result<FileLinks> {
        self.files()?.host(file_id, rename)?;
        let base = self.base_url.trim_end_matches('/');
        Ok(FileLinks {
            view: format!("{}/plugin_view/{}", base, file_id),
            download: format!("{}/plugin_download/{}", base, file_id),
        })
    }
}
