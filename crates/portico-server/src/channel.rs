//! Encrypted request/response channel on `POST /api/<name>`.
//!
//! ## Overview
//!
//! Every request carries `{"data": Envelope}` sealed under the session key
//! established by the handshake. The channel:
//!
//! 1. looks the session up from the `session_id` cookie,
//! 2. opens the envelope and parses the JSON payload,
//! 3. hands the payload to the named sub-API,
//! 4. seals the reply under the same key.
//!
//! Channel-level failures (no session, bad envelope, failed tag, bad
//! payload) are plain JSON errors and are never encrypted. Sub-API failures travel inside the
//! envelope with status 200.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use portico_core::SessionId;
use portico_crypto::{CryptoError, Envelope};
use portico_store::{Session, Store};

use crate::api::{ApiDispatcher, Caller};
use crate::cookie;
use crate::error::{Result, ServerError};

#[derive(Deserialize)]
struct ChannelBody {
    data: Envelope,
}

/// Parse a decrypted payload. A JSON string is parsed once more, since some
/// clients double-encode their requests.
pub(crate) fn parse_payload(bytes: &[u8]) -> Option<Value> {
    match serde_json::from_slice(bytes).ok()? {
        Value::String(inner) => serde_json::from_str(&inner).ok(),
        value => Some(value),
    }
}

/// The encrypted API endpoint.
#[derive(Clone)]
pub struct Channel {
    store: Arc<dyn Store>,
    dispatcher: Arc<ApiDispatcher>,
    timeout: Duration,
}

impl Channel {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<ApiDispatcher>, timeout: Duration) -> Self {
        Self {
            store,
            dispatcher,
            timeout,
        }
    }

    /// Serve one call to sub-API `api`.
    pub async fn handle(&self, api: &str, headers: &HeaderMap, body: &[u8]) -> Result<Response> {
        let session = self.session(headers).await?;
        match tokio::time::timeout(self.timeout, self.exchange(api, &session, body)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(api, session = session.id.short(), "api call timed out");
                Err(ServerError::Timeout)
            }
        }
    }

    async fn session(&self, headers: &HeaderMap) -> Result<Session> {
        let Some(raw) = cookie::read_session_cookie(headers) else {
            tracing::warn!("api call without session cookie");
            return Err(ServerError::InvalidSession);
        };
        let Ok(id) = SessionId::parse(raw) else {
            tracing::warn!("api call with malformed session cookie");
            return Err(ServerError::InvalidSession);
        };
        match self.store.get_session(&id).await? {
            Some(session) => Ok(session),
            None => {
                tracing::warn!(session = id.short(), "api call for unknown session");
                Err(ServerError::InvalidSession)
            }
        }
    }

    async fn exchange(&self, api: &str, session: &Session, body: &[u8]) -> Result<Response> {
        let ChannelBody { data: envelope } = serde_json::from_slice(body)
            .map_err(|e| ServerError::InvalidEnvelope(e.to_string()))?;

        let plaintext = envelope.open(&session.key).map_err(|e| match e {
            CryptoError::Authentication => {
                tracing::warn!(session = session.id.short(), "envelope failed authentication");
                ServerError::Authentication
            }
            other => ServerError::InvalidEnvelope(other.to_string()),
        })?;

        let request = parse_payload(&plaintext)
            .ok_or_else(|| ServerError::InvalidRequest("payload is not JSON".into()))?;

        self.store.touch_session(&session.id).await?;

        let caller = Caller {
            session_id: session.id.clone(),
            user_id: session.user_id.filter(|_| session.logged_in),
        };
        let (status, reply) = self.dispatcher.dispatch(api, request, &caller).await;

        let sealed = Envelope::seal(&session.key, reply.to_string().as_bytes())?;
        Ok((status, Json(sealed)).into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{header, HeaderValue, StatusCode};
    use portico_crypto::{generate_session_id, SessionKey};
    use portico_store::MemoryStore;
    use portico_testkit::{open_envelope, seal_request};
    use serde_json::json;

    use crate::api::SubApi;

    struct Whoami;

    #[async_trait]
    impl SubApi for Whoami {
        async fn handle(&self, request: Value, caller: &Caller) -> Value {
            json!({ "echo": request, "user": caller.user_id })
        }
    }

    struct Fixture {
        channel: Channel,
        store: Arc<dyn Store>,
        key: SessionKey,
        headers: HeaderMap,
        id: SessionId,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let id = generate_session_id();
        let key = SessionKey::generate();
        store.create_session(&id, &key).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; session_id={}", id.as_str())).unwrap(),
        );
        let dispatcher = Arc::new(ApiDispatcher::new().with("whoami", Arc::new(Whoami)));
        Fixture {
            channel: Channel::new(store.clone(), dispatcher, Duration::from_secs(5)),
            store,
            key,
            headers,
            id,
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(br#"{"a":1}"#), Some(json!({"a": 1})));
        assert_eq!(parse_payload(br#""{\"a\":1}""#), Some(json!({"a": 1})));
        assert_eq!(parse_payload(b"[1,2]"), Some(json!([1, 2])));
        assert_eq!(parse_payload(b"hello"), None);
        assert_eq!(parse_payload(br#""not json inside""#), None);
    }

    #[tokio::test]
    async fn test_roundtrip_and_login_filter() {
        let f = fixture().await;
        let body = seal_request(&f.key, &json!({"ping": true}));

        let response = f
            .channel
            .handle("whoami", &f.headers, body.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply = open_envelope(&f.key, &body_json(response).await);
        assert_eq!(reply, json!({"echo": {"ping": true}, "user": null}));

        f.store.set_login_state(&f.id, Some(3), true).await.unwrap();
        let response = f
            .channel
            .handle("whoami", &f.headers, body.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(open_envelope(&f.key, &body_json(response).await)["user"], 3);
    }

    #[tokio::test]
    async fn test_unknown_api_is_encrypted_404() {
        let f = fixture().await;
        let body = seal_request(&f.key, &json!({}));
        let response = f
            .channel
            .handle("nope", &f.headers, body.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let reply = open_envelope(&f.key, &body_json(response).await);
        assert_eq!(reply, json!({"error": "unknown_api"}));
    }

    #[tokio::test]
    async fn test_session_errors() {
        let f = fixture().await;
        let body = seal_request(&f.key, &json!({})).to_string();

        let err = f
            .channel
            .handle("whoami", &HeaderMap::new(), body.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidSession));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session_id=unknown"));
        let err = f
            .channel
            .handle("whoami", &headers, body.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidSession));
    }

    #[tokio::test]
    async fn test_envelope_and_payload_errors() {
        let f = fixture().await;

        let wrong_key = seal_request(&SessionKey::generate(), &json!({})).to_string();
        let err = f
            .channel
            .handle("whoami", &f.headers, wrong_key.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Authentication));

        let err = f
            .channel
            .handle("whoami", &f.headers, br#"{"data": "plain"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidEnvelope(_)));

        let sealed = Envelope::seal(&f.key, b"not json").unwrap();
        let body = json!({ "data": sealed }).to_string();
        let err = f
            .channel
            .handle("whoami", &f.headers, body.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidRequest(_)));
    }
}
