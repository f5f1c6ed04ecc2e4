//! Session key exchange on `POST /api`.
//!
//! The client generates a 32-byte AES key, wraps `{"key": <base64 key>}`
//! (optionally tagged `"info": "init_com"`) with the server's RSA-OAEP
//! public key and posts `{"data": <base64 ciphertext>}`. The server stores
//! the key against the caller's session (creating one if needed) and answers
//! with `{"info": "com_ok", "session": <id>}` sealed under the new key, plus
//! the session cookie.
//!
//! Repeating the handshake with the same cookie rotates the key in place;
//! login state survives rotation.

use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use portico_core::SessionId;
use portico_crypto::{generate_session_id, Envelope, ServerKeyPair, SessionKey};
use portico_store::{Store, UpsertOutcome};

use crate::cookie;
use crate::error::{Result, ServerError};

#[derive(Deserialize)]
struct HandshakeBody {
    data: String,
}

#[derive(Deserialize)]
struct InitCom {
    #[serde(default)]
    info: Option<String>,
    key: String,
}

/// Handles the key exchange.
#[derive(Clone)]
pub struct Handshake {
    store: Arc<dyn Store>,
    keys: Arc<ServerKeyPair>,
    cookie_max_age: u64,
}

impl Handshake {
    pub fn new(store: Arc<dyn Store>, keys: Arc<ServerKeyPair>, cookie_max_age: u64) -> Self {
        Self {
            store,
            keys,
            cookie_max_age,
        }
    }

    /// Run the exchange for one request.
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> Result<Response> {
        let key = self.unwrap_key(body).map_err(|e| {
            tracing::warn!(error = %e, "handshake rejected");
            ServerError::HandshakeFailed(e.to_string())
        })?;

        let cookie = cookie::read_session_cookie(headers);
        let session_id = match cookie.map(SessionId::parse) {
            Some(Ok(id)) => id,
            Some(Err(_)) => {
                tracing::debug!("unusable session cookie, minting a new id");
                generate_session_id()
            }
            None => generate_session_id(),
        };

        let outcome = self.store.upsert_session_key(&session_id, &key).await?;
        match outcome {
            UpsertOutcome::Created => {
                tracing::info!(session = session_id.short(), "session created")
            }
            UpsertOutcome::Rotated => {
                tracing::info!(session = session_id.short(), "session key rotated")
            }
        }

        let reply = json!({ "info": "com_ok", "session": session_id.as_str() });
        let envelope = Envelope::seal(&key, reply.to_string().as_bytes())?;

        let mut response = (StatusCode::OK, Json(envelope)).into_response();
        response.headers_mut().insert(
            header::SET_COOKIE,
            cookie::session_cookie(&session_id, self.cookie_max_age),
        );
        Ok(response)
    }

    /// Decode, decrypt and validate the handshake body.
    fn unwrap_key(&self, body: &[u8]) -> Result<SessionKey> {
        let body: HandshakeBody = serde_json::from_slice(body)?;
        let plaintext = self.keys.decrypt_base64(&body.data)?;
        let init: InitCom = serde_json::from_slice(&plaintext)?;
        if let Some(info) = init.info.as_deref().filter(|info| *info != "init_com") {
            return Err(ServerError::HandshakeFailed(format!("unexpected info: {}", info)));
        }
        Ok(SessionKey::from_base64(&init.key)?)
    }
}
