//! Function and hook registries.
//!
//! Plugins contribute behavior in two ways:
//!
//! - **Functions**: named callbacks. `portal` functions are callable by
//!   clients through the `data` sub-API and by page recipes; `background`
//!   functions are started once at startup.
//! - **Hooks**: callbacks that fire at fixed points of the request, page and
//!   startup lifecycle. Every callback registered for a hook runs, in
//!   registration order.
//!
//! Both registries are filled while plugins mount and are read-only
//! afterwards; `AppState` owns them behind an `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::error::{Result, ServerError};

/// Boxed future returned by plugin callbacks.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A plugin callback: portal function, background function or hook.
pub type Callback = Arc<dyn Fn(RequestContext) -> BoxFuture<anyhow::Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`Callback`].
///
/// ```rust
/// use portico_server::registry::callback;
/// use serde_json::json;
///
/// let add = callback(|ctx| async move {
///     let a = ctx.arg("a").and_then(|v| v.as_i64()).unwrap_or(0);
///     let b = ctx.arg("b").and_then(|v| v.as_i64()).unwrap_or(0);
///     Ok(json!(a + b))
/// });
/// # let _ = add;
/// ```
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Which table a function lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionKind {
    Portal,
    Background,
}

/// Receipt for a registered function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionHandle {
    pub kind: FunctionKind,
    pub name: String,
}

/// A function together with the plugin that registered it.
#[derive(Clone)]
pub struct RegisteredFunction {
    pub plugin: String,
    pub callback: Callback,
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

/// Named portal and background functions.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    tables: BTreeMap<FunctionKind, BTreeMap<String, RegisteredFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `name`. A later registration of the same
    /// name replaces the earlier one.
    pub fn register(
        &mut self,
        kind: FunctionKind,
        name: impl Into<String>,
        plugin: impl Into<String>,
        callback: Callback,
    ) -> FunctionHandle {
        let name = name.into();
        let plugin = plugin.into();
        let previous = self
            .tables
            .entry(kind)
            .or_default()
            .insert(name.clone(), RegisteredFunction { plugin, callback });
        if let Some(previous) = previous {
            tracing::warn!(?kind, %name, replaced = %previous.plugin, "function replaced");
        }
        FunctionHandle { kind, name }
    }

    /// Look a function up by name.
    pub fn get(&self, kind: FunctionKind, name: &str) -> Option<&RegisteredFunction> {
        self.tables.get(&kind).and_then(|table| table.get(name))
    }

    /// Resolve a handle returned by [`FunctionRegistry::register`].
    pub fn resolve(&self, handle: &FunctionHandle) -> Option<&RegisteredFunction> {
        self.get(handle.kind, &handle.name)
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: FunctionKind) -> Vec<&str> {
        self.tables
            .get(&kind)
            .map(|table| table.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// All functions of one kind.
    pub fn iter(&self, kind: FunctionKind) -> impl Iterator<Item = (&str, &RegisteredFunction)> {
        self.tables
            .get(&kind)
            .into_iter()
            .flat_map(|table| table.iter().map(|(name, f)| (name.as_str(), f)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hooks
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle points plugins can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    /// Every request, before classification.
    OnRequest,
    /// Once, before utilities are generated and the listener opens.
    BeforeServerStart,
    /// Before a page is rendered; object results are merged into page data.
    RenderPage,
    /// Before a recipe's data sources are fetched.
    BeforeGetData,
    /// After data sources are fetched; object results are merged in.
    AfterGetData,
    BeforeGenUtils,
    AfterGenUtils,
    /// Long-running task started with the background functions.
    Run,
}

impl Hook {
    pub const ALL: [Hook; 8] = [
        Hook::OnRequest,
        Hook::BeforeServerStart,
        Hook::RenderPage,
        Hook::BeforeGetData,
        Hook::AfterGetData,
        Hook::BeforeGenUtils,
        Hook::AfterGenUtils,
        Hook::Run,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::OnRequest => "on_request",
            Hook::BeforeServerStart => "before_server_start",
            Hook::RenderPage => "render_page",
            Hook::BeforeGetData => "before_get_data",
            Hook::AfterGetData => "after_get_data",
            Hook::BeforeGenUtils => "before_gen_utils",
            Hook::AfterGenUtils => "after_gen_utils",
            Hook::Run => "run",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Hook {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        Hook::ALL
            .into_iter()
            .find(|hook| hook.as_str() == s)
            .ok_or_else(|| ServerError::Config(format!("unknown hook: {}", s)))
    }
}

/// Receipt for a registered hook callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookHandle {
    pub hook: Hook,
    pub plugin: String,
}

/// Hook callbacks in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<Hook, Vec<RegisteredFunction>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.hooks.iter().map(|(hook, fs)| (hook.as_str(), fs.len())))
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `hook` on behalf of `plugin`.
    ///
    /// A plugin may register each hook at most once.
    pub fn register(
        &mut self,
        hook: Hook,
        plugin: impl Into<String>,
        callback: Callback,
    ) -> Result<HookHandle> {
        let plugin = plugin.into();
        let callbacks = self.hooks.entry(hook).or_default();
        if callbacks.iter().any(|f| f.plugin == plugin) {
            return Err(ServerError::Plugin {
                plugin,
                message: format!("hook {} already registered", hook),
            });
        }
        callbacks.push(RegisteredFunction {
            plugin: plugin.clone(),
            callback,
        });
        Ok(HookHandle { hook, plugin })
    }

    /// Number of callbacks registered for `hook`.
    pub fn count(&self, hook: Hook) -> usize {
        self.hooks.get(&hook).map_or(0, Vec::len)
    }

    /// Callbacks for `hook`, in registration order.
    pub fn callbacks(&self, hook: Hook) -> &[RegisteredFunction] {
        self.hooks.get(&hook).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run every callback for `hook` and collect their results.
    ///
    /// A failing callback is logged and skipped; it never fails the caller.
    pub async fn run(&self, hook: Hook, ctx: &RequestContext) -> Vec<Value> {
        let mut results = Vec::with_capacity(self.count(hook));
        for registered in self.callbacks(hook) {
            let ctx = ctx.clone().with_plugin(&registered.plugin);
            match (registered.callback)(ctx).await {
                Ok(value) => results.push(value),
                Err(e) => {
                    tracing::warn!(%hook, plugin = %registered.plugin, error = %e, "hook failed");
                }
            }
        }
        results
    }
}

/// Merge every JSON object in `results` into `target`; other values are
/// ignored.
pub fn merge_objects(target: &mut Map<String, Value>, results: Vec<Value>) {
    for result in results {
        if let Value::Object(map) = result {
            target.extend(map);
        }
    }
}
