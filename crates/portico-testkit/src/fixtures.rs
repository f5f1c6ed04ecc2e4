//! Test fixtures and helpers.
//!
//! Everything here panics on failure; it is meant for tests only.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::prelude::*;
use rsa::Oaep;
use serde_json::{json, Value};
use sha2::Sha256;
use tempfile::TempDir;

use portico_crypto::{Envelope, ServerKeyPair, SessionKey};

/// A 2048-bit server keypair shared by every test in the process.
///
/// Key generation is slow, so it happens once.
pub fn test_keys() -> &'static ServerKeyPair {
    static KEYS: OnceLock<ServerKeyPair> = OnceLock::new();
    KEYS.get_or_init(|| ServerKeyPair::generate(2048).expect("generate test keypair"))
}

/// RSA-OAEP (SHA-256) encrypt `plaintext` to the server, base64 encoded.
pub fn seal_for_server(keys: &ServerKeyPair, plaintext: &[u8]) -> String {
    let ciphertext = keys
        .public_key()
        .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), plaintext)
        .expect("RSA-OAEP encrypt");
    BASE64_STANDARD.encode(ciphertext)
}

/// Body of a `POST /api` handshake offering `key`.
pub fn handshake_body(keys: &ServerKeyPair, key: &SessionKey) -> Value {
    let init = json!({ "info": "init_com", "key": key.to_base64() });
    json!({ "data": seal_for_server(keys, init.to_string().as_bytes()) })
}

/// Body of a `POST /api/<name>` call carrying `request`.
pub fn seal_request(key: &SessionKey, request: &Value) -> Value {
    let envelope = Envelope::seal(key, request.to_string().as_bytes()).expect("seal request");
    json!({ "data": envelope })
}

/// Decrypt an envelope returned by the server and parse its JSON.
pub fn open_envelope(key: &SessionKey, envelope: &Value) -> Value {
    let envelope: Envelope =
        serde_json::from_value(envelope.clone()).expect("response is an envelope");
    let plaintext = envelope.open(key).expect("open envelope");
    serde_json::from_slice(&plaintext).expect("envelope holds JSON")
}

// ─────────────────────────────────────────────────────────────────────────────
// Site directories
// ─────────────────────────────────────────────────────────────────────────────

/// A temporary site: `pages/`, `shared/` and a `manifest.json`.
///
/// The directory is removed when the builder is dropped.
pub struct SiteBuilder {
    dir: TempDir,
}

impl SiteBuilder {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(dir.path().join("pages")).expect("create pages dir");
        std::fs::create_dir_all(dir.path().join("shared")).expect("create shared dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root().join("pages")
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.root().join("shared")
    }

    fn write(&self, relative: impl AsRef<Path>, contents: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, contents).expect("write site file");
    }

    /// A route with `index.html` as its template.
    pub fn page(self, route: &str, template: &str, recipe: &str) -> Self {
        self.write(format!("pages/{}/index.html", route), template);
        self.recipe(route, recipe)
    }

    /// Only the recipe of a route.
    pub fn recipe(self, route: &str, recipe: &str) -> Self {
        self.write(format!("pages/{}/recipe.yaml", route), recipe);
        self
    }

    /// A route's `access.yaml`.
    pub fn access(self, route: &str, yaml: &str) -> Self {
        self.write(format!("pages/{}/access.yaml", route), yaml);
        self
    }

    /// A file under `pages/<route>/static/`.
    pub fn static_file(self, route: &str, name: &str, contents: &str) -> Self {
        self.write(format!("pages/{}/static/{}", route, name), contents);
        self
    }

    /// A file in the shared directory.
    pub fn shared(self, name: &str, contents: &str) -> Self {
        self.write(format!("shared/{}", name), contents);
        self
    }

    /// Write `manifest.json`.
    pub fn manifest(self, manifest: &Value) -> Self {
        self.write("manifest.json", &manifest.to_string());
        self
    }
}

impl Default for SiteBuilder {
    fn default() -> Self {
        Self::new()
    }
}
