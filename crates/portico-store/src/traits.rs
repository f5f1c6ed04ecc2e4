//! Store trait: the abstract interface for session and user persistence.
//!
//! This trait allows the server to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory.

use async_trait::async_trait;
use portico_core::{AccessSnapshot, SessionId, UserId};
use portico_crypto::SessionKey;
use serde::Serialize;

use crate::error::Result;

/// Role assigned to new accounts. Seeded as `"user"` by every backend.
pub const DEFAULT_ROLE_ID: i64 = 0;

/// A session row.
///
/// Created by the handshake with no user attached; login attaches a user
/// and sets `logged_in`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub key: SessionKey,
    pub user_id: Option<UserId>,
    pub logged_in: bool,
    /// When the session was created (Unix ms).
    pub created_at: i64,
    /// Last handshake or accepted API request (Unix ms).
    pub last_used_at: i64,
}

impl Session {
    /// A fresh anonymous session.
    pub fn new(id: SessionId, key: SessionKey, now: i64) -> Self {
        Self {
            id,
            key,
            user_id: None,
            logged_in: false,
            created_at: now,
            last_used_at: now,
        }
    }
}

/// Result of the handshake's create-or-rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No session had this id; one was created.
    Created,
    /// The session existed; its key was replaced.
    Rotated,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    /// Login name, unique across users.
    pub identifier: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub role_id: i64,
    pub preferences: serde_json::Value,
}

/// A named role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// Optional public profile of a user, handed to portal functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub user_id: UserId,
    pub name: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// The Store trait: async interface for session and user persistence.
///
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the
/// runtime.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Session Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new anonymous session.
    ///
    /// Fails with `DuplicateSession` if the id is taken.
    async fn create_session(&self, id: &SessionId, key: &SessionKey) -> Result<Session>;

    /// Get a session by id.
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Replace the key of an existing session.
    ///
    /// Fails with `NotFound` if there is no such session.
    async fn rotate_key(&self, id: &SessionId, key: &SessionKey) -> Result<Session>;

    /// Rotate the key if the session exists, create it otherwise.
    ///
    /// Atomic: no reader observes the session without a key.
    async fn upsert_session_key(&self, id: &SessionId, key: &SessionKey)
        -> Result<UpsertOutcome>;

    /// Attach or detach a user. Returns `false` if the session is unknown.
    async fn set_login_state(
        &self,
        id: &SessionId,
        user_id: Option<UserId>,
        logged_in: bool,
    ) -> Result<bool>;

    /// Mark a session as used now. Returns `false` if the session is unknown.
    async fn touch_session(&self, id: &SessionId) -> Result<bool>;

    /// Delete sessions idle since before `idle_cutoff_ms`.
    ///
    /// Returns the number of sessions removed.
    async fn expire_sessions(&self, idle_cutoff_ms: i64) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // User Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a user. Fails with `DuplicateUser` if the identifier is taken.
    async fn add_user(&self, identifier: &str, password_hash: &str, role_id: i64) -> Result<User>;

    /// Look up a user by login name.
    async fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<User>>;

    /// Look up a user by id.
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Roles and Profiles
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a role with the next free id.
    async fn add_role(&self, name: &str, description: &str) -> Result<Role>;

    /// Name of a role.
    async fn get_role_name(&self, role_id: i64) -> Result<Option<String>>;

    /// Profile of a user, if one was set.
    async fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>>;

    /// Insert or replace a user's profile.
    async fn upsert_profile(&self, profile: &Profile) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Access Snapshot
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve the login and role state behind a raw cookie value.
    ///
    /// Never fails. Each step that stops resolution yields an error snapshot
    /// with its own message, storage failures included.
    async fn resolve_access_snapshot(&self, session_id: Option<&str>) -> AccessSnapshot {
        let Some(raw) = session_id else {
            return AccessSnapshot::error("No session id");
        };
        let Ok(id) = SessionId::parse(raw) else {
            return AccessSnapshot::error("Session not found");
        };

        let session = match self.get_session(&id).await {
            Ok(Some(session)) => session,
            Ok(None) => return AccessSnapshot::error("Session not found"),
            Err(e) => {
                tracing::warn!(session = id.short(), error = %e, "snapshot lookup failed");
                return AccessSnapshot::error("Storage error");
            }
        };

        let user_id = match session.user_id {
            Some(user_id) if session.logged_in => user_id,
            _ => return AccessSnapshot::error("User not logged in"),
        };

        let user = match self.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return AccessSnapshot::error("User not found"),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "snapshot user lookup failed");
                return AccessSnapshot::error("Storage error");
            }
        };

        match self.get_role_name(user.role_id).await {
            Ok(Some(role)) => AccessSnapshot::granted(user.id, role),
            Ok(None) => AccessSnapshot::error("Role not found"),
            Err(e) => {
                tracing::warn!(role_id = user.role_id, error = %e, "snapshot role lookup failed");
                AccessSnapshot::error("Storage error")
            }
        }
    }
}
