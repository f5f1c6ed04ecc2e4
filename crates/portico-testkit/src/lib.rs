//! # Portico Testkit
//!
//! Testing utilities for Portico.
//!
//! ## Overview
//!
//! - **Fixtures**: a shared server keypair, the client half of the
//!   handshake and channel, and a temporary site directory builder
//! - **Generators**: proptest strategies for keys, session ids, access
//!   rules, snapshots and JSON payloads
//!
//! ## Talking to a server
//!
//! ```rust
//! use portico_crypto::SessionKey;
//! use portico_testkit::{handshake_body, open_envelope, seal_request, test_keys};
//! use serde_json::json;
//!
//! let key = SessionKey::generate();
//! // POST this to /api ...
//! let body = handshake_body(test_keys(), &key);
//! assert!(body["data"].is_string());
//!
//! // ... then this to /api/<name>.
//! let request = seal_request(&key, &json!({"info": "logout"}));
//! assert_eq!(open_envelope(&key, &request["data"]), json!({"info": "logout"}));
//! ```
//!
//! ## Site directories
//!
//! ```rust
//! use portico_testkit::SiteBuilder;
//!
//! let site = SiteBuilder::new()
//!     .page("home", "<h1>hi</h1>", "page:\n  template: index.html\n")
//!     .access("home", "access:\n  login_required: true\n");
//! assert!(site.pages_dir().join("home/recipe.yaml").exists());
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    handshake_body, open_envelope, seal_for_server, seal_request, test_keys, SiteBuilder,
};
