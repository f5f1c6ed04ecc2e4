//! Application state, assembly and lifecycle.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use portico_server::{AppBuilder, Config};
//!
//! # async fn run() -> portico_server::Result<()> {
//! let config = Config::from_env()?;
//! let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
//! let state = AppBuilder::new(config).build().await?;
//! portico_server::app::startup(&state).await?;
//! portico_server::app::serve(state, listener).await
//! # }
//! ```

use std::sync::Arc;

use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use portico_core::{AccessRules, Manifest};
use portico_crypto::ServerKeyPair;
use portico_store::{MemoryStore, SqliteStore, Store};

use crate::api::{ApiDispatcher, AuthApi, DataApi};
use crate::assets::{Assets, FileRegistry};
use crate::channel::Channel;
use crate::config::{self, Config, DatabaseConfig};
use crate::context::RequestContext;
use crate::error::{Result, ServerError};
use crate::handshake::Handshake;
use crate::maintenance::Maintenance;
use crate::pages::{PageBuilder, PassthroughRenderer, TemplateRenderer};
use crate::plugin::{mount_plugins, Plugin};
use crate::registry::{FunctionKind, FunctionRegistry, Hook, HookRegistry};
use crate::router::create_router;
use crate::utils_gen;

/// Shared state behind every request.
pub struct AppState {
    pub config: Arc<Config>,
    pub manifest: Arc<Manifest>,
    pub store: Arc<dyn Store>,
    pub keys: Arc<ServerKeyPair>,
    pub access: Arc<AccessRules>,
    pub functions: Arc<FunctionRegistry>,
    pub hooks: Arc<HookRegistry>,
    pub files: Arc<FileRegistry>,
    pub assets: Assets,
    pub handshake: Handshake,
    pub channel: Channel,
    pub pages: PageBuilder,
    base_url: String,
}

impl AppState {
    /// Public origin used in links handed to clients.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Assembles an [`AppState`]. Anything not supplied is loaded from the
/// locations in [`Config`].
pub struct AppBuilder {
    config: Config,
    manifest: Option<Manifest>,
    store: Option<Arc<dyn Store>>,
    keys: Option<ServerKeyPair>,
    access: Option<AccessRules>,
    plugins: Vec<Arc<dyn Plugin>>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            manifest: None,
            store: None,
            keys: None,
            access: None,
            plugins: Vec::new(),
            renderer: Arc::new(PassthroughRenderer),
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_keys(mut self, keys: ServerKeyPair) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_access_rules(mut self, access: AccessRules) -> Self {
        self.access = Some(access);
        self
    }

    /// Make a plugin available. It is mounted only if the manifest lists it.
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub async fn build(self) -> Result<Arc<AppState>> {
        let config = self.config;
        config.validate()?;

        let manifest = match self.manifest {
            Some(manifest) => manifest,
            None => config::load_manifest(&config.manifest_path)?,
        };
        let access = match self.access {
            Some(access) => access,
            None => config::load_access_rules(&config.pages_dir, &manifest)?,
        };
        tracing::info!(rules = access.len(), "access rules loaded");

        let store = match self.store {
            Some(store) => store,
            None => open_store(&config.database)?,
        };
        let keys = match self.keys {
            Some(keys) => keys,
            None => load_or_generate_keys(&config).await?,
        };

        let mut functions = FunctionRegistry::new();
        let mut hooks = HookRegistry::new();
        let mounted = mount_plugins(&self.plugins, &manifest, &mut functions, &mut hooks);
        tracing::info!(plugins = ?mounted, "plugins mounted");

        let base_url = manifest
            .server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", config.bind_address));

        let config = Arc::new(config);
        let keys = Arc::new(keys);
        let functions = Arc::new(functions);
        let hooks = Arc::new(hooks);
        let files = Arc::new(FileRegistry::new(config.cache_dir()));

        let data = DataApi::new(store.clone(), functions.clone(), files.clone(), base_url.clone());
        let dispatcher = ApiDispatcher::new()
            .with("auth", Arc::new(AuthApi::new(store.clone(), manifest.auth.mode.clone())))
            .with("data", Arc::new(data.clone()));

        let pages = PageBuilder::new(
            config.pages_dir.clone(),
            config.shared_dir.clone(),
            store.clone(),
            data,
            hooks.clone(),
            self.renderer,
            files.clone(),
            base_url.clone(),
        );

        Ok(Arc::new(AppState {
            handshake: Handshake::new(store.clone(), keys.clone(), config.session_max_age),
            channel: Channel::new(store.clone(), Arc::new(dispatcher), config.api_timeout),
            assets: Assets::new(
                config.pages_dir.clone(),
                config.shared_dir.clone(),
                config.utils_dir(),
            ),
            manifest: Arc::new(manifest),
            access: Arc::new(access),
            config,
            store,
            keys,
            functions,
            hooks,
            files,
            pages,
            base_url,
        }))
    }
}

fn open_store(database: &DatabaseConfig) -> Result<Arc<dyn Store>> {
    match database {
        DatabaseConfig::Memory => {
            tracing::info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        DatabaseConfig::Sqlite(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            tracing::info!(path = %path.display(), "opening SQLite store");
            Ok(Arc::new(SqliteStore::open(path)?))
        }
    }
}

/// Load the server key from the data directory, generating and saving one
/// on first start.
async fn load_or_generate_keys(config: &Config) -> Result<ServerKeyPair> {
    let path = config.private_key_path();
    if path.exists() {
        tracing::info!(path = %path.display(), "loading server key");
        return Ok(ServerKeyPair::load(&path)?);
    }

    tracing::info!(bits = config.rsa_bits, "generating server key");
    let bits = config.rsa_bits;
    let keys = tokio::task::spawn_blocking(move || ServerKeyPair::generate(bits))
        .await
        .map_err(|e| ServerError::Config(format!("key generation task failed: {}", e)))??;

    tokio::fs::create_dir_all(&config.data_dir).await?;
    tokio::fs::write(&path, keys.to_pkcs8_pem()?).await?;
    Ok(keys)
}

/// Run the startup sequence: `before_server_start` hooks, cache reset,
/// utility generation, maintenance, then background functions and `run`
/// hooks.
///
/// Returns the handles of every task started.
pub async fn startup(state: &Arc<AppState>) -> Result<Vec<JoinHandle<()>>> {
    state
        .hooks
        .run(Hook::BeforeServerStart, &RequestContext::detached(json!({})))
        .await;

    state.files.reset_cache_dir()?;

    utils_gen::generate_utils(
        &state.hooks,
        &state.config.utils_dir(),
        state.keys.public_key_pem(),
        state.functions.names(FunctionKind::Portal),
    )
    .await?;

    let mut tasks = vec![Maintenance::new(
        state.store.clone(),
        state.files.clone(),
        state.config.session_idle_ttl,
    )
    .spawn(state.config.maintenance_interval)];

    let background = state
        .functions
        .iter(FunctionKind::Background)
        .map(|(name, f)| (name.to_string(), f.clone()));
    let run_hooks = state
        .hooks
        .callbacks(Hook::Run)
        .iter()
        .map(|f| (Hook::Run.to_string(), f.clone()));

    for (name, function) in background.chain(run_hooks) {
        let ctx = RequestContext::new(json!({}), state.files.clone(), state.base_url())
            .with_plugin(&function.plugin);
        tasks.push(tokio::spawn(async move {
            tracing::info!(task = %name, plugin = %function.plugin, "background task started");
            if let Err(e) = (function.callback)(ctx).await {
                tracing::error!(task = %name, plugin = %function.plugin, error = %e, "background task failed");
            }
        }));
    }

    tracing::info!(tasks = tasks.len(), "startup complete");
    Ok(tasks)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(state: Arc<AppState>, listener: TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    tracing::info!(%address, "server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("graceful shutdown initiated");
}
