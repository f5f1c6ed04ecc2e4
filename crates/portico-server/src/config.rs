//! Server configuration.
//!
//! Settings come from `PORTICO_*` environment variables with defaults; the
//! `portico` binary lets command-line flags override them. The application
//! manifest (routes, auth, plugins) and per-route access rules are loaded
//! from disk once at startup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use portico_core::{AccessRule, AccessRules, Manifest};

use crate::error::{Result, ServerError};

/// Where sessions and users are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// In-process, lost on restart.
    Memory,
    /// SQLite file.
    Sqlite(PathBuf),
}

impl DatabaseConfig {
    /// `memory` or `:memory:` for an in-process store, anything else is a
    /// SQLite path.
    pub fn parse(value: &str) -> Self {
        match value {
            "memory" | ":memory:" => DatabaseConfig::Memory,
            path => DatabaseConfig::Sqlite(PathBuf::from(path)),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Path to the JSON application manifest.
    pub manifest_path: PathBuf,

    /// Root of the page recipes (`<pages>/<route>/recipe.yaml`).
    pub pages_dir: PathBuf,

    /// Shared templates and utilities.
    pub shared_dir: PathBuf,

    /// Server keys, generated utilities and cached files.
    pub data_dir: PathBuf,

    pub database: DatabaseConfig,

    /// `Max-Age` of the session cookie (seconds).
    pub session_max_age: u64,

    /// Sessions unused for this long are deleted by maintenance.
    pub session_idle_ttl: Duration,

    pub maintenance_interval: Duration,

    /// Upper bound on one encrypted API call.
    pub api_timeout: Duration,

    /// Size of a freshly generated server key.
    pub rsa_bits: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5000)),
            manifest_path: PathBuf::from("manifest.json"),
            pages_dir: PathBuf::from("pages"),
            shared_dir: PathBuf::from("shared"),
            data_dir: PathBuf::from("nucleus"),
            database: DatabaseConfig::Sqlite(PathBuf::from("nucleus/portico.db")),
            session_max_age: 3600,
            session_idle_ttl: Duration::from_secs(24 * 3600),
            maintenance_interval: Duration::from_secs(60),
            api_timeout: Duration::from_secs(10),
            rsa_bits: 2048,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("PORTICO_BIND") {
            config.bind_address = addr
                .parse()
                .map_err(|e| ServerError::Config(format!("PORTICO_BIND={}: {}", addr, e)))?;
        }
        if let Some(path) = lookup("PORTICO_MANIFEST") {
            config.manifest_path = path.into();
        }
        if let Some(path) = lookup("PORTICO_PAGES_DIR") {
            config.pages_dir = path.into();
        }
        if let Some(path) = lookup("PORTICO_SHARED_DIR") {
            config.shared_dir = path.into();
        }
        if let Some(path) = lookup("PORTICO_DATA_DIR") {
            config.database = DatabaseConfig::Sqlite(Path::new(&path).join("portico.db"));
            config.data_dir = path.into();
        }
        if let Some(db) = lookup("PORTICO_DATABASE") {
            config.database = DatabaseConfig::parse(&db);
        }
        if let Some(secs) = lookup("PORTICO_SESSION_MAX_AGE") {
            config.session_max_age = parse_number("PORTICO_SESSION_MAX_AGE", &secs)?;
        }
        if let Some(secs) = lookup("PORTICO_SESSION_IDLE_TTL") {
            config.session_idle_ttl = parse_secs("PORTICO_SESSION_IDLE_TTL", &secs)?;
        }
        if let Some(secs) = lookup("PORTICO_MAINTENANCE_INTERVAL") {
            config.maintenance_interval = parse_secs("PORTICO_MAINTENANCE_INTERVAL", &secs)?;
        }
        if let Some(secs) = lookup("PORTICO_API_TIMEOUT") {
            config.api_timeout = parse_secs("PORTICO_API_TIMEOUT", &secs)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Defaults with every directory under one site root and an in-memory
    /// database.
    pub fn for_site(root: &Path) -> Self {
        Self {
            manifest_path: root.join("manifest.json"),
            pages_dir: root.join("pages"),
            shared_dir: root.join("shared"),
            data_dir: root.join("nucleus"),
            database: DatabaseConfig::Memory,
            ..Self::default()
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.maintenance_interval.is_zero() {
            return Err(ServerError::Config(
                "maintenance interval must be positive".into(),
            ));
        }
        if self.api_timeout.is_zero() {
            return Err(ServerError::Config("API timeout must be positive".into()));
        }
        Ok(())
    }

    /// Directory for generated `pem.js` / `portal.js`.
    pub fn utils_dir(&self) -> PathBuf {
        self.data_dir.join("utils")
    }

    /// Directory for files created by plugins.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// PEM file holding the server's private key.
    pub fn private_key_path(&self) -> PathBuf {
        self.data_dir.join("private_key.pem")
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| ServerError::Config(format!("{}={}: {}", key, value, e)))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    parse_number(key, value).map(Duration::from_secs)
}

/// Read and parse the application manifest.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ServerError::Config(format!("cannot read manifest {}: {}", path.display(), e))
    })?;
    Ok(Manifest::from_json(&text)?)
}

#[derive(Deserialize)]
struct AccessFile {
    #[serde(default)]
    access: Option<AccessRule>,
}

/// Load `<pages>/<route>/access.yaml` for every route the manifest names.
///
/// Routes without the file, or whose file has no `access:` key, get no
/// rule and are open. A file that is not valid YAML stops startup.
pub fn load_access_rules(pages_dir: &Path, manifest: &Manifest) -> Result<AccessRules> {
    let mut rules = AccessRules::new();

    for route in manifest.server.routes.route_names() {
        let path = pages_dir.join(route).join("access.yaml");
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        let file: AccessFile = serde_yaml::from_str(&text).map_err(|e| {
            ServerError::Config(format!("{}: {}", path.display(), e))
        })?;
        if let Some(rule) = file.access {
            tracing::debug!(route, ?rule, "access rule loaded");
            rules.insert(route, rule);
        }
    }

    Ok(rules)
}
