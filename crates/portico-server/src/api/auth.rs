//! The `auth` sub-API: signup, login, logout and auth parameters.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use rand::RngCore;
use serde_json::{json, Value};

use portico_store::{Store, StoreError, DEFAULT_ROLE_ID};

use super::{error_payload, Caller, SubApi};

fn argon2() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

/// Hash a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)?;
    Ok(argon2().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Check a password against a PHC string. Unparseable hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| argon2().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// Credentials from a `signup` or `authorize` request; `None` if either is
/// missing or empty.
fn credentials(request: &Value) -> Option<(String, String)> {
    let field = |name: &str| {
        request
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Some((field("username")?, field("password")?))
}

/// Account management over the encrypted channel.
pub struct AuthApi {
    store: Arc<dyn Store>,
    auth_mode: String,
}

impl AuthApi {
    pub fn new(store: Arc<dyn Store>, auth_mode: impl Into<String>) -> Self {
        Self {
            store,
            auth_mode: auth_mode.into(),
        }
    }

    async fn signup(&self, request: &Value) -> Value {
        let Some((username, password)) = credentials(request) else {
            return error_payload("Username and password required.");
        };

        match self.store.get_user_by_identifier(&username).await {
            Ok(Some(_)) => return error_payload("Username already exists."),
            Ok(None) => {}
            Err(e) => return storage_error(e),
        }

        let hashed = match tokio::task::spawn_blocking(move || hash_password(&password)).await {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "password hashing failed");
                return error_payload("Internal error.");
            }
            Err(e) => {
                tracing::error!(error = %e, "password hashing task failed");
                return error_payload("Internal error.");
            }
        };

        match self.store.add_user(&username, &hashed, DEFAULT_ROLE_ID).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, "user registered");
                json!({ "status": "success", "message": "User registered successfully." })
            }
            Err(StoreError::DuplicateUser(_)) => error_payload("Username already exists."),
            Err(e) => storage_error(e),
        }
    }

    async fn authorize(&self, request: &Value, caller: &Caller) -> Value {
        let Some((username, password)) = credentials(request) else {
            return error_payload("Username and password required.");
        };

        let user = match self.store.get_user_by_identifier(&username).await {
            Ok(user) => user,
            Err(e) => return storage_error(e),
        };

        // Unknown user and wrong password look the same to the client.
        let verified = match user {
            Some(user) => {
                let hash = user.password_hash.clone();
                let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
                    .await
                    .unwrap_or(false);
                ok.then_some(user)
            }
            None => None,
        };
        let Some(user) = verified else {
            tracing::warn!(session = caller.session_id.short(), "login failed");
            return error_payload("Invalid username or password.");
        };

        match self
            .store
            .set_login_state(&caller.session_id, Some(user.id), true)
            .await
        {
            Ok(true) => {
                tracing::info!(user_id = user.id, session = caller.session_id.short(), "user logged in");
                json!({
                    "status": "success",
                    "token": username,
                    "message": "Authorization successful.",
                })
            }
            Ok(false) => error_payload("Session not found."),
            Err(e) => storage_error(e),
        }
    }

    async fn logout(&self, caller: &Caller) -> Value {
        match self
            .store
            .set_login_state(&caller.session_id, None, false)
            .await
        {
            Ok(_) => {
                tracing::info!(session = caller.session_id.short(), "user logged out");
                json!({ "status": "success", "message": "Logged out successfully." })
            }
            Err(e) => storage_error(e),
        }
    }

    fn request_data(&self, request: &Value) -> Value {
        match request.get("data").and_then(Value::as_str) {
            Some("auth_params") => json!({
                "info": "auth_params",
                "data": { "AUTH_MODE": self.auth_mode },
            }),
            _ => error_payload("Unknown data request."),
        }
    }
}

fn storage_error(e: StoreError) -> Value {
    tracing::error!(error = %e, "auth storage failure");
    error_payload("Internal error.")
}

#[async_trait]
impl SubApi for AuthApi {
    async fn handle(&self, request: Value, caller: &Caller) -> Value {
        match request.get("info").and_then(Value::as_str) {
            Some("request_data") => self.request_data(&request),
            Some("signup") => self.signup(&request).await,
            Some("authorize") => self.authorize(&request, caller).await,
            Some("logout") => self.logout(caller).await,
            _ => error_payload("Unknown auth request."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_crypto::{generate_session_id, SessionKey};
    use portico_store::MemoryStore;

    async fn setup() -> (AuthApi, Arc<dyn Store>, Caller) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let session_id = generate_session_id();
        store
            .create_session(&session_id, &SessionKey::generate())
            .await
            .unwrap();
        let api = AuthApi::new(store.clone(), "password");
        (
            api,
            store,
            Caller {
                session_id,
                user_id: None,
            },
        )
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not a phc string"));
    }

    #[tokio::test]
    async fn test_signup_login_logout() {
        let (api, store, caller) = setup().await;
        let creds = json!({"info": "signup", "username": "alice", "password": "pw"});

        let reply = api.handle(creds.clone(), &caller).await;
        assert_eq!(reply["message"], "User registered successfully.");
        let reply = api.handle(creds, &caller).await;
        assert_eq!(reply["message"], "Username already exists.");

        let reply = api
            .handle(
                json!({"info": "authorize", "username": "alice", "password": "pw"}),
                &caller,
            )
            .await;
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["token"], "alice");

        let session = store.get_session(&caller.session_id).await.unwrap().unwrap();
        assert!(session.logged_in);

        let reply = api.handle(json!({"info": "logout"}), &caller).await;
        assert_eq!(reply["message"], "Logged out successfully.");
        let session = store.get_session(&caller.session_id).await.unwrap().unwrap();
        assert!(!session.logged_in);
        assert_eq!(session.user_id, None);
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let (api, _store, caller) = setup().await;
        api.handle(
            json!({"info": "signup", "username": "bob", "password": "right"}),
            &caller,
        )
        .await;

        for request in [
            json!({"info": "authorize", "username": "bob", "password": "wrong"}),
            json!({"info": "authorize", "username": "nobody", "password": "x"}),
        ] {
            let reply = api.handle(request, &caller).await;
            assert_eq!(reply["message"], "Invalid username or password.");
        }

        let reply = api
            .handle(json!({"info": "signup", "username": "", "password": "x"}), &caller)
            .await;
        assert_eq!(reply["message"], "Username and password required.");
    }

    #[tokio::test]
    async fn test_auth_params_and_unknown() {
        let (api, _store, caller) = setup().await;
        let reply = api
            .handle(json!({"info": "request_data", "data": "auth_params"}), &caller)
            .await;
        assert_eq!(
            reply,
            json!({"info": "auth_params", "data": {"AUTH_MODE": "password"}})
        );

        let reply = api.handle(json!({"info": "dance"}), &caller).await;
        assert_eq!(
            reply,
            json!({"status": "error", "message": "Unknown auth request."})
        );
    }
}
