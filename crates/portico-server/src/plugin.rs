//! Plugin host.
//!
//! Plugins are compiled in and handed to the application builder. At
//! startup each plugin named in the manifest's `plugins` section is mounted:
//! it receives its configuration and registers hooks and functions through
//! a [`PluginContext`].

use std::sync::Arc;

use serde_json::Value;

use portico_core::Manifest;

use crate::error::Result;
use crate::registry::{
    Callback, FunctionHandle, FunctionKind, FunctionRegistry, Hook, HookHandle, HookRegistry,
};

/// A compiled-in extension.
pub trait Plugin: Send + Sync {
    /// Name under which the manifest configures this plugin.
    fn name(&self) -> &str;

    /// Register hooks and functions.
    fn mount(&self, ctx: &mut PluginContext<'_>) -> anyhow::Result<()>;
}

/// Registration surface handed to [`Plugin::mount`].
pub struct PluginContext<'a> {
    plugin: String,
    config: Value,
    functions: &'a mut FunctionRegistry,
    hooks: &'a mut HookRegistry,
}

impl<'a> PluginContext<'a> {
    pub fn new(
        plugin: impl Into<String>,
        config: Value,
        functions: &'a mut FunctionRegistry,
        hooks: &'a mut HookRegistry,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            config,
            functions,
            hooks,
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    /// The plugin's manifest configuration (`null` if none).
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Register a hook callback. Fails if this plugin already hooked `hook`.
    pub fn register_hook(&mut self, hook: Hook, callback: Callback) -> Result<HookHandle> {
        self.hooks.register(hook, self.plugin.as_str(), callback)
    }

    /// Expose a function to clients and page recipes.
    pub fn portal(&mut self, name: &str, callback: Callback) -> FunctionHandle {
        self.functions
            .register(FunctionKind::Portal, name, self.plugin.as_str(), callback)
    }

    /// Start a function once when the server starts.
    pub fn background(&mut self, name: &str, callback: Callback) -> FunctionHandle {
        self.functions
            .register(FunctionKind::Background, name, self.plugin.as_str(), callback)
    }
}

/// Mount the plugins the manifest asks for.
///
/// A manifest entry with no matching plugin, or a plugin whose mount
/// fails, is logged and skipped. Returns the names of mounted plugins.
pub fn mount_plugins(
    plugins: &[Arc<dyn Plugin>],
    manifest: &Manifest,
    functions: &mut FunctionRegistry,
    hooks: &mut HookRegistry,
) -> Vec<String> {
    let mut mounted = Vec::new();

    for (name, config) in &manifest.plugins {
        let Some(plugin) = plugins.iter().find(|p| p.name() == name) else {
            tracing::warn!(plugin = %name, "plugin listed in manifest is not registered");
            continue;
        };

        let mut ctx = PluginContext::new(name.as_str(), config.clone(), functions, hooks);
        match plugin.mount(&mut ctx) {
            Ok(()) => {
                tracing::info!(plugin = %name, "plugin mounted");
                mounted.push(name.clone());
            }
            Err(e) => tracing::error!(plugin = %name, error = %e, "plugin mount failed"),
        }
    }

    for plugin in plugins {
        if !manifest.plugins.contains_key(plugin.name()) {
            tracing::debug!(plugin = plugin.name(), "plugin not enabled in manifest");
        }
    }

    mounted
}
