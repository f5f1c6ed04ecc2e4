//! Client utilities generated at startup.
//!
//! - `pem.js` exports the server's public key for the handshake.
//! - `portal.js` exports one wrapper per portal function, each calling the
//!   `data` sub-API through the bundled `tools.js`.
//!
//! Both land in the utils directory and are served under `/utils_<file>`.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::context::RequestContext;
use crate::error::Result;
use crate::registry::{Hook, HookRegistry};

/// `pem.js` source.
pub fn pem_js(public_key_pem: &str) -> String {
    format!("export const pem = `{}`;\n", public_key_pem.trim_end())
}

/// `portal.js` source for the given function names.
pub fn portal_js<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::from("import { api_send } from '/utils_tools.js';\n\nexport const portal = {\n");
    for name in names {
        // Names are serialized as JSON strings so any name is a valid key.
        let quoted = serde_json::Value::from(name).to_string();
        out.push_str(&format!(
            "  {q}: (args = {{}}) => api_send('data', {{ name: {q}, args }}),\n",
            q = quoted
        ));
    }
    out.push_str("};\n");
    out
}

/// Write one utility, wrapped in the `*_gen_utils` hooks.
async fn generate(hooks: &HookRegistry, dir: &Path, name: &str, body: String) -> Result<PathBuf> {
    hooks
        .run(Hook::BeforeGenUtils, &RequestContext::detached(json!({ "name": name })))
        .await;

    let path = dir.join(name);
    tokio::fs::write(&path, body).await?;
    tracing::debug!(path = %path.display(), "utility generated");

    hooks
        .run(
            Hook::AfterGenUtils,
            &RequestContext::detached(json!({ "name": name, "output_path": path.display().to_string() })),
        )
        .await;
    Ok(path)
}

/// Generate `pem.js` and `portal.js` into `dir`.
pub async fn generate_utils<'a>(
    hooks: &HookRegistry,
    dir: &Path,
    public_key_pem: &str,
    portal_names: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(vec![
        generate(hooks, dir, "portal.js", portal_js(portal_names)).await?,
        generate(hooks, dir, "pem.js", pem_js(public_key_pem)).await?,
    ])
}
