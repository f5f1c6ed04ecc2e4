//! Strong type definitions shared across Portico.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Name of the cookie that carries the session token.
pub const SESSION_COOKIE: &str = "session_id";

/// Length of a session's symmetric key in bytes (AES-256).
pub const SESSION_KEY_LEN: usize = 32;

/// Longest session token accepted from a client.
const MAX_SESSION_ID_LEN: usize = 100;

/// Numeric user identifier, as assigned by the user store.
pub type UserId = i64;

/// An opaque, URL-safe session token.
///
/// Tokens are minted by the crypto layer from 32 bytes of CSPRNG output and
/// travel in the `session_id` cookie. Client-supplied values are checked to
/// be non-empty, bounded and drawn from the base64url alphabet before they
/// reach the store.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Parse a client-supplied token.
    pub fn parse(value: &str) -> Result<Self> {
        let valid = !value.is_empty()
            && value.len() <= MAX_SESSION_ID_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(value.to_owned()))
        } else {
            Err(CoreError::InvalidSessionId)
        }
    }

    /// Build a token from raw entropy (base64url, no padding).
    ///
    /// Callers must supply CSPRNG output; 32 bytes give a 43-character token.
    pub fn from_entropy(bytes: &[u8; 32]) -> Self {
        Self(BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short prefix that is safe to put in logs.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl TryFrom<String> for SessionId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}..)", self.short())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Get current time in milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
