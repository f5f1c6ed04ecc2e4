//! The application manifest.
//!
//! A JSON document describing the site: which logical routes serve which
//! paths, how authentication behaves and which plugins to mount.
//!
//! ```json
//! {
//!   "server": {
//!     "base_url": "https://example.org",
//!     "routes": { "/": "home", "/dashboard": ["admin_dash", "user_dash"] }
//!   },
//!   "auth": { "mode": "password", "login_url": "/login" },
//!   "plugins": { "navbar": { "sticky": true } }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// The parsed manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    /// Plugin name -> plugin configuration.
    #[serde(default)]
    pub plugins: BTreeMap<String, Value>,
}

impl Manifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::InvalidManifest(e.to_string()))
    }

    /// Configuration value for a plugin (`null` if absent).
    pub fn plugin_config(&self, name: &str) -> Value {
        self.plugins.get(name).cloned().unwrap_or(Value::Null)
    }
}

/// `server` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub routes: RouteTable,
}

/// `auth` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    /// Reported to clients through the `auth_params` request.
    #[serde(default = "default_auth_mode")]
    pub mode: String,
    /// Where denied `login_required` page requests are redirected.
    #[serde(default = "default_login_url")]
    pub login_url: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            mode: default_auth_mode(),
            login_url: default_login_url(),
        }
    }
}

fn default_auth_mode() -> String {
    "password".to_string()
}

fn default_login_url() -> String {
    "/login".to_string()
}

/// One path maps to a single route name or an ordered list of candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RouteSpec {
    One(String),
    Many(Vec<String>),
}

impl From<RouteSpec> for Vec<String> {
    fn from(spec: RouteSpec) -> Self {
        match spec {
            RouteSpec::One(name) => vec![name],
            RouteSpec::Many(names) => names,
        }
    }
}

/// Exact path -> ordered candidate route names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "HashMap<String, RouteSpec>", into = "HashMap<String, Vec<String>>")]
pub struct RouteTable {
    routes: HashMap<String, Vec<String>>,
}

impl From<HashMap<String, RouteSpec>> for RouteTable {
    fn from(raw: HashMap<String, RouteSpec>) -> Self {
        Self {
            routes: raw.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

impl From<RouteTable> for HashMap<String, Vec<String>> {
    fn from(table: RouteTable) -> Self {
        table.routes
    }
}

impl RouteTable {
    /// Register candidates for a path, replacing any previous entry.
    pub fn insert(&mut self, path: impl Into<String>, candidates: Vec<String>) {
        self.routes.insert(path.into(), candidates);
    }

    /// Candidate route names for an exact path, in declared order.
    pub fn candidates(&self, path: &str) -> &[String] {
        self.routes.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every route name mentioned anywhere in the table, deduplicated.
    pub fn route_names(&self) -> BTreeSet<&str> {
        self.routes
            .values()
            .flat_map(|names| names.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "server": {
            "base_url": "https://example.org",
            "routes": {
                "/": "home",
                "/dashboard": ["admin_dash", "user_dash"]
            }
        },
        "auth": { "mode": "password", "login_url": "/signin" },
        "plugins": { "navbar": { "sticky": true } }
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.server.base_url.as_deref(), Some("https://example.org"));
        assert_eq!(manifest.server.routes.candidates("/"), ["home".to_string()]);
        assert_eq!(
            manifest.server.routes.candidates("/dashboard"),
            ["admin_dash".to_string(), "user_dash".to_string()]
        );
        assert!(manifest.server.routes.candidates("/missing").is_empty());
        assert_eq!(manifest.auth.login_url, "/signin");
        assert_eq!(manifest.plugin_config("navbar")["sticky"], true);
        assert!(manifest.plugin_config("other").is_null());
    }

    #[test]
    fn test_route_names_are_unique() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let names: Vec<_> = manifest.server.routes.route_names().into_iter().collect();
        assert_eq!(names, vec!["admin_dash", "home", "user_dash"]);
    }

    #[test]
    fn test_defaults() {
        let manifest = Manifest::from_json("{}").unwrap();
        assert_eq!(manifest.auth.login_url, "/login");
        assert_eq!(manifest.auth.mode, "password");
        assert!(manifest.server.routes.route_names().is_empty());
    }

    #[test]
    fn test_invalid_manifest() {
        assert!(matches!(
            Manifest::from_json("{\"server\": 3}"),
            Err(CoreError::InvalidManifest(_))
        ));
    }
}
