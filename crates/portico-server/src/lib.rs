//! # Portico Server
//!
//! HTTP front end of Portico: a session key exchange, an encrypted API
//! channel, access-controlled page routing and a compiled-in plugin host.
//!
//! ## Overview
//!
//! - **Handshake** (`POST /api`): the client wraps a fresh AES-256 key with
//!   the server's RSA public key; the server binds it to a `session_id`
//!   cookie.
//! - **Channel** (`POST /api/<name>`): AES-GCM envelopes under the session
//!   key, dispatched to the `auth` and `data` sub-APIs.
//! - **Pages**: every other path is matched against the manifest's route
//!   table, checked against per-route access rules and built from a recipe.
//! - **Assets**: `/static_<route>/<file>`, `/utils_<file>` and
//!   `/plugin_<view|download>/<id>`.
//!
//! ## Key Types
//!
//! - [`AppBuilder`] / [`AppState`]: assembly and shared state
//! - [`Plugin`]: the extension point
//! - [`Config`]: environment-driven settings
//! - [`ServerError`]: every request failure, mapped to a status and code
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use portico_server::registry::callback;
//! use portico_server::{AppBuilder, Config, Plugin, PluginContext};
//! use serde_json::json;
//!
//! struct Stats;
//!
//! impl Plugin for Stats {
//!     fn name(&self) -> &str {
//!         "stats"
//!     }
//!
//!     fn mount(&self, ctx: &mut PluginContext<'_>) -> anyhow::Result<()> {
//!         ctx.portal("visitors", callback(|_| async { Ok(json!(42)) }));
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> portico_server::Result<()> {
//! let state = AppBuilder::new(Config::from_env()?)
//!     .with_plugin(Arc::new(Stats))
//!     .build()
//!     .await?;
//! let app = portico_server::create_router(state);
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod app;
pub mod assets;
pub mod channel;
pub mod config;
pub mod context;
pub mod cookie;
pub mod error;
pub mod handshake;
pub mod logging;
pub mod maintenance;
pub mod pages;
pub mod plugin;
pub mod registry;
pub mod router;
pub mod utils_gen;

pub use app::{AppBuilder, AppState};
pub use config::{Config, DatabaseConfig};
pub use context::{FileLinks, RequestContext};
pub use error::{Result, ServerError};
pub use pages::{PageContext, PassthroughRenderer, TemplateRenderer};
pub use plugin::{Plugin, PluginContext};
pub use registry::{Callback, FunctionKind, FunctionRegistry, Hook, HookRegistry};
pub use router::create_router;
