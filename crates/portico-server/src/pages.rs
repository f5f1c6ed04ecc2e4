//! Page pipeline.
//!
//! ## Overview
//!
//! Every route lives in `<pages>/<route>/`. Its `recipe.yaml` names a
//! template and the data sources that feed it:
//!
//! ```yaml
//! page:
//!   template: index.html
//! data:
//!   sources:
//!     - name: me
//!       type: internal
//!       datas: [profile, settings]
//!     - name: stats
//!       type: portal
//!       portal_name: site_stats
//!       args: { days: 7 }
//!     - name: weather
//!       type: rest
//!       endpoint: https://api.example.org/today
//! ```
//!
//! [`PageBuilder::build`] gathers the data, lets plugins adjust it through
//! the `before_get_data`, `after_get_data` and `render_page` hooks, and
//! hands template and data to a [`TemplateRenderer`].
//!
//! ## Design Notes
//!
//! A source that fails never fails the page; its slot holds a
//! `{"status": "error", ..}` object instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use reqwest::Client;
use serde_json::{json, Map, Value};

use portico_core::{is_safe_relative_path, UserId};
use portico_store::Store;

use crate::api::DataApi;
use crate::assets::FileRegistry;
use crate::context::RequestContext;
use crate::error::{Result, ServerError};
use crate::registry::{merge_objects, Hook, HookRegistry};

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a renderer needs for one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageContext {
    pub route: String,
    /// Template name as written in the recipe.
    pub template_name: String,
    /// Raw template text.
    pub template: String,
    /// Source name -> gathered data, after hooks.
    pub datas: Map<String, Value>,
    /// Prefix for generated and bundled utilities (`/utils_`).
    pub utils_prefix: String,
    /// Prefix for this route's static files (`/static_<route>/`).
    pub static_prefix: String,
}

/// Turns a template and its data into HTML.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, page: &PageContext) -> anyhow::Result<String>;
}

/// Returns the template text unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughRenderer;

impl TemplateRenderer for PassthroughRenderer {
    fn render(&self, page: &PageContext) -> anyhow::Result<String> {
        Ok(page.template.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recipes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Recipe {
    #[serde(default)]
    page: PageSection,
    #[serde(default)]
    data: Option<DataSection>,
}

#[derive(Debug, Default, Deserialize)]
struct PageSection {
    #[serde(default)]
    template: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DataSection {
    #[serde(default)]
    sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SourceSpec {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    portal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    datas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
}

/// Upper bound for one `rest` source fetch.
pub const REST_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

fn source_error(message: &str) -> Value {
    json!({ "status": "error", "message": message })
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builds pages from recipes.
#[derive(Clone)]
pub struct PageBuilder {
    pages_dir: PathBuf,
    shared_dir: PathBuf,
    store: Arc<dyn Store>,
    data: DataApi,
    hooks: Arc<HookRegistry>,
    renderer: Arc<dyn TemplateRenderer>,
    files: Arc<FileRegistry>,
    base_url: String,
    http: Client,
}

impl PageBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pages_dir: impl Into<PathBuf>,
        shared_dir: impl Into<PathBuf>,
        store: Arc<dyn Store>,
        data: DataApi,
        hooks: Arc<HookRegistry>,
        renderer: Arc<dyn TemplateRenderer>,
        files: Arc<FileRegistry>,
        base_url: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .timeout(REST_SOURCE_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "http client setup failed, using defaults");
                Client::new()
            });
        Self {
            pages_dir: pages_dir.into(),
            shared_dir: shared_dir.into(),
            store,
            data,
            hooks,
            renderer,
            files,
            base_url: base_url.into(),
            http,
        }
    }

    fn hook_context(&self, args: Value, user_id: Option<UserId>) -> RequestContext {
        RequestContext::new(args, self.files.clone(), self.base_url.clone()).with_user(user_id, None)
    }

    /// Build the page for `route` as seen by `user_id`.
    pub async fn build(&self, route: &str, user_id: Option<UserId>) -> Result<String> {
        if !is_safe_relative_path(route) {
            return Err(ServerError::Page(format!("invalid route name: {}", route)));
        }
        let recipe_path = self.pages_dir.join(route).join("recipe.yaml");
        let text = match tokio::fs::read_to_string(&recipe_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServerError::Page(format!("recipe not found for route '{}'", route)));
            }
            Err(e) => return Err(e.into()),
        };
        // An empty file parses as YAML null.
        let recipe: Recipe = serde_yaml::from_str::<Option<Recipe>>(&text)
            .map_err(|e| ServerError::Page(format!("{}: {}", recipe_path.display(), e)))?
            .unwrap_or_default();

        let mut datas = match &recipe.data {
            Some(section) => self.gather(route, &section.sources, user_id).await,
            None => Map::new(),
        };

        let template_name = recipe
            .page
            .template
            .ok_or_else(|| ServerError::Page(format!("no template defined for route '{}'", route)))?;
        let template = self.read_template(route, &template_name).await?;

        let results = self
            .hooks
            .run(
                Hook::RenderPage,
                &self.hook_context(
                    json!({ "route": route, "template": template_name, "datas": datas }),
                    user_id,
                ),
            )
            .await;
        merge_objects(&mut datas, results);

        let page = PageContext {
            route: route.to_string(),
            template_name,
            template,
            datas,
            utils_prefix: "/utils_".to_string(),
            static_prefix: format!("/static_{}/", route),
        };
        self.renderer
            .render(&page)
            .map_err(|e| ServerError::Page(format!("render failed for '{}': {}", route, e)))
    }

    /// Route-local template first, then the shared directory.
    async fn read_template(&self, route: &str, name: &str) -> Result<String> {
        if !is_safe_relative_path(name) {
            return Err(ServerError::Page(format!("invalid template path: {}", name)));
        }
        for path in [self.pages_dir.join(route).join(name), self.shared_dir.join(name)] {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return Ok(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServerError::Page(format!("template not found: {}/{}", route, name)))
    }

    async fn gather(
        &self,
        route: &str,
        sources: &[SourceSpec],
        user_id: Option<UserId>,
    ) -> Map<String, Value> {
        let sources_json = serde_json::to_value(sources).unwrap_or(Value::Null);
        self.hooks
            .run(
                Hook::BeforeGetData,
                &self.hook_context(json!({ "route": route, "sources": sources_json }), user_id),
            )
            .await;

        let mut results = Map::new();
        for source in sources {
            tracing::debug!(route, source = %source.name, kind = %source.kind, "fetching page data");
            let value = match source.kind.as_str() {
                "portal" => self.portal_source(source, user_id).await,
                "internal" => self.internal_source(source, user_id).await,
                "rest" => self.rest_source(source).await,
                _ => source_error("Unknown source type"),
            };
            results.insert(source.name.clone(), value);
        }

        let hook_results = self
            .hooks
            .run(
                Hook::AfterGetData,
                &self.hook_context(
                    json!({ "route": route, "sources": sources_json, "results": results }),
                    user_id,
                ),
            )
            .await;
        merge_objects(&mut results, hook_results);
        results
    }

    async fn portal_source(&self, source: &SourceSpec, user_id: Option<UserId>) -> Value {
        let name = source.portal_name.as_deref().unwrap_or_default();
        let args = source.args.clone().unwrap_or_else(|| json!({}));
        let mut reply = self.data.call(name, args, user_id).await;
        if reply["status"] == "success" {
            reply["result"].take()
        } else {
            source_error("Portal API error")
        }
    }

    /// GET the source's endpoint and wrap the JSON reply.
    async fn rest_source(&self, source: &SourceSpec) -> Value {
        let Some(endpoint) = source.endpoint.as_deref() else {
            return source_error("No endpoint defined");
        };
        let fetched = async {
            let response = self.http.get(endpoint).send().await?.error_for_status()?;
            Ok::<Value, reqwest::Error>(response.json().await?)
        };
        match fetched.await {
            Ok(data) => json!({ "status": "success", "data": data }),
            Err(e) => {
                tracing::warn!(source = %source.name, endpoint, error = %e, "rest source failed");
                source_error(&e.to_string())
            }
        }
    }

    async fn internal_source(&self, source: &SourceSpec, user_id: Option<UserId>) -> Value {
        let mut out = Map::new();
        for item in &source.datas {
            let value = match (item.as_str(), user_id) {
                (_, None) => Value::Null,
                ("profile", Some(id)) => match self.store.get_profile(id).await {
                    Ok(profile) => serde_json::to_value(profile).unwrap_or(Value::Null),
                    Err(e) => {
                        tracing::warn!(user_id = id, error = %e, "profile lookup failed");
                        Value::Null
                    }
                },
                ("settings", Some(id)) => match self.store.get_user(id).await {
                    Ok(user) => user.map(|u| u.preferences).unwrap_or(Value::Null),
                    Err(e) => {
                        tracing::warn!(user_id = id, error = %e, "settings lookup failed");
                        Value::Null
                    }
                },
                _ => continue,
            };
            out.insert(item.clone(), value);
        }
        Value::Object(out)
    }

    /// Where recipes are read from.
    pub fn pages_dir(&self) -> &Path {
        &self.pages_dir
    }
}
