//! Static assets, utility scripts and plugin-hosted files.
//!
//! - `/static_<route>/<file>` reads `<pages>/<route>/static/<file>`.
//! - `/utils_<file>` looks in the bundled utilities, then the shared
//!   directory, then the generated-utilities directory.
//! - `/plugin_view/<id>` and `/plugin_download/<id>` serve files a plugin
//!   registered in the [`FileRegistry`].
//!
//! Every path component coming from the URL is checked with
//! [`is_safe_relative_path`] before it touches the filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use rand::distributions::Alphanumeric;
use rand::Rng;

use portico_core::{is_safe_relative_path, now_millis, FileDisposition};

use crate::error::{Result, ServerError};

/// Utilities compiled into the binary.
const BUNDLED_UTILS: &[(&str, &str)] = &[("tools.js", include_str!("../assets/tools.js"))];

const FILE_ID_LEN: usize = 10;

/// Guess a content type from a file name.
pub fn content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "woff2" => "font/woff2",
        "csv" => "text/csv; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn file_response(bytes: Vec<u8>, file_name: &str, disposition: FileDisposition) -> Response {
    let mut response = (StatusCode::OK, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(file_name)),
    );
    if disposition == FileDisposition::Download {
        let safe: String = file_name
            .chars()
            .map(|c| if c.is_ascii_graphic() && c != '"' { c } else { '_' })
            .collect();
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe)) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }
    response
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ServerError::FileNotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File registry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct FileEntry {
    /// Name shown to the client on download.
    display_name: String,
    path: PathBuf,
    /// Whether `/plugin_*` may serve it.
    hosted: bool,
    /// Cached files are deleted after this instant (Unix ms).
    expires_at: Option<i64>,
}

/// Files created or exposed by plugins, keyed by a short random id.
#[derive(Debug)]
pub struct FileRegistry {
    cache_dir: PathBuf,
    entries: RwLock<HashMap<String, FileEntry>>,
}

impl FileRegistry {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Create the cache directory and empty it of files from a previous run.
    pub fn reset_cache_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = removed {
                tracing::warn!(path = %path.display(), error = %e, "failed to clear cached file");
            }
        }
        Ok(())
    }

    /// Reserve a cache file for `plugin`.
    ///
    /// Returns the new file id and the path the plugin should write to. The
    /// file is deleted by maintenance once `ttl` has passed.
    pub fn create(&self, plugin: &str, file_name: &str, ttl: Duration) -> Result<(String, PathBuf)> {
        if !is_safe_relative_path(file_name) || file_name.contains('/') {
            return Err(ServerError::FileNotFound(file_name.to_string()));
        }
        let id = short_id();
        let path = self
            .cache_dir
            .join(format!("{}_{}_{}", id, plugin, file_name));
        let entry = FileEntry {
            display_name: file_name.to_string(),
            path: path.clone(),
            hosted: false,
            expires_at: Some(now_millis().saturating_add(ttl.as_millis() as i64)),
        };
        self.write().insert(id.clone(), entry);
        Ok((id, path))
    }

    /// Expose a file created with [`FileRegistry::create`] under `/plugin_*`.
    pub fn host(&self, id: &str, rename: Option<&str>) -> Result<()> {
        let mut entries = self.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| ServerError::FileNotFound(id.to_string()))?;
        if let Some(name) = rename {
            entry.display_name = name.to_string();
        }
        entry.hosted = true;
        Ok(())
    }

    /// Expose an existing file that the registry does not manage.
    pub fn register(&self, display_name: &str, path: impl Into<PathBuf>) -> String {
        let id = short_id();
        let entry = FileEntry {
            display_name: display_name.to_string(),
            path: path.into(),
            hosted: true,
            expires_at: None,
        };
        self.write().insert(id.clone(), entry);
        id
    }

    /// Display name and path of a hosted file.
    pub fn lookup(&self, id: &str) -> Option<(String, PathBuf)> {
        self.read()
            .get(id)
            .filter(|entry| entry.hosted)
            .map(|entry| (entry.display_name.clone(), entry.path.clone()))
    }

    /// Path of any registered file, hosted or not.
    pub fn path(&self, id: &str) -> Option<PathBuf> {
        self.read().get(id).map(|entry| entry.path.clone())
    }

    /// Forget and delete cached files that expired before `now`.
    pub fn sweep_expired(&self, now: i64) -> usize {
        let expired: Vec<FileEntry> = {
            let mut entries = self.write();
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.expires_at.is_some_and(|at| at < now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };

        for entry in &expired {
            match std::fs::remove_file(&entry.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %entry.path.display(), error = %e, "failed to delete cached file");
                }
            }
        }
        expired.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, FileEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, FileEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn short_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(FILE_ID_LEN)
        .map(char::from)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Serving
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem-backed asset serving.
#[derive(Debug, Clone)]
pub struct Assets {
    pages_dir: PathBuf,
    shared_dir: PathBuf,
    utils_dir: PathBuf,
}

impl Assets {
    pub fn new(
        pages_dir: impl Into<PathBuf>,
        shared_dir: impl Into<PathBuf>,
        utils_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pages_dir: pages_dir.into(),
            shared_dir: shared_dir.into(),
            utils_dir: utils_dir.into(),
        }
    }

    /// `/static_<route>/<file>`.
    pub async fn static_asset(&self, route: &str, file: &str) -> Result<Response> {
        if !is_safe_relative_path(route) || !is_safe_relative_path(file) {
            return Err(ServerError::FileNotFound(format!("{}/{}", route, file)));
        }
        let path = self.pages_dir.join(route).join("static").join(file);
        let bytes = read_file(&path).await?;
        Ok(file_response(bytes, file, FileDisposition::View))
    }

    /// `/utils_<file>`.
    pub async fn utility(&self, file: &str) -> Result<Response> {
        if !is_safe_relative_path(file) {
            return Err(ServerError::FileNotFound(file.to_string()));
        }
        if let Some((_, body)) = BUNDLED_UTILS.iter().find(|(name, _)| *name == file) {
            return Ok(file_response(body.as_bytes().to_vec(), file, FileDisposition::View));
        }
        for dir in [&self.shared_dir, &self.utils_dir] {
            match read_file(&dir.join(file)).await {
                Ok(bytes) => return Ok(file_response(bytes, file, FileDisposition::View)),
                Err(ServerError::FileNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ServerError::FileNotFound(file.to_string()))
    }

    /// `/plugin_<view|download>/<id>`.
    pub async fn plugin_file(
        &self,
        files: &FileRegistry,
        disposition: Option<FileDisposition>,
        id: &str,
    ) -> Result<Response> {
        let (name, path) = files
            .lookup(id)
            .ok_or_else(|| ServerError::FileNotFound(id.to_string()))?;
        let disposition = disposition.ok_or(ServerError::InvalidMethod)?;
        let bytes = read_file(&path).await?;
        Ok(file_response(bytes, &name, disposition))
    }
}
