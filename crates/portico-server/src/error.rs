//! Error types for the server.
//!
//! Every error a request can hit maps to a fixed HTTP status and a short
//! JSON body `{"error": "<code>"}`. Details go to the log, never to the
//! client.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use portico_core::CoreError;
use portico_crypto::CryptoError;
use portico_store::StoreError;

use crate::cookie;

/// Errors that can occur while serving requests or starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No session cookie, or the session is unknown.
    #[error("invalid session")]
    InvalidSession,

    /// Handshake body could not be decrypted or parsed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Channel body is not a well-formed envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Envelope tag did not verify under the session key.
    #[error("envelope authentication failed")]
    Authentication,

    /// Decrypted channel payload is not JSON.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request did not finish within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// A hosted or static file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// `/plugin_<method>` with a method other than view or download.
    #[error("invalid file method")]
    InvalidMethod,

    /// API endpoints only accept POST.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// A page could not be built.
    #[error("page error: {0}")]
    Page(String),

    /// A plugin misbehaved during mount.
    #[error("plugin {plugin}: {message}")]
    Plugin { plugin: String, message: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    /// HTTP status and client-visible error code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::InvalidSession => (StatusCode::FORBIDDEN, "invalid_session"),
            ServerError::HandshakeFailed(_) => (StatusCode::BAD_REQUEST, "handshake_failed"),
            ServerError::InvalidEnvelope(_) | ServerError::Authentication => {
                (StatusCode::BAD_REQUEST, "invalid_envelope")
            }
            ServerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ServerError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            ServerError::FileNotFound(_) => (StatusCode::NOT_FOUND, "file_not_found"),
            ServerError::InvalidMethod => (StatusCode::BAD_REQUEST, "invalid_method"),
            ServerError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, code, "request rejected");
        }

        let mut response = (status, Json(json!({ "error": code }))).into_response();
        if matches!(self, ServerError::InvalidSession) {
            response
                .headers_mut()
                .insert(header::SET_COOKIE, cookie::expired_session_cookie());
        }
        response
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
