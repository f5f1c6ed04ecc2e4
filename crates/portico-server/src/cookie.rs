//! `session_id` cookie formatting and parsing.

use axum::http::{header, HeaderMap, HeaderValue};

use portico_core::{SessionId, SESSION_COOKIE};

/// `Set-Cookie` value that hands a session to the client.
pub fn session_cookie(id: &SessionId, max_age_secs: u64) -> HeaderValue {
    let value = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; Secure; SameSite=Lax",
        SESSION_COOKIE,
        id.as_str(),
        max_age_secs
    );
    // Session ids are base64url, so the header is always visible ASCII.
    HeaderValue::from_str(&value).unwrap_or_else(|_| expired_session_cookie())
}

/// `Set-Cookie` value that makes the client drop its session.
pub fn expired_session_cookie() -> HeaderValue {
    HeaderValue::from_static(
        "session_id=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; HttpOnly; Secure; SameSite=Lax",
    )
}

/// Raw value of the `session_id` cookie, if the request carries one.
pub fn read_session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}
