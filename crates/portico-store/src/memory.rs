//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite, but keeps everything in memory with no
//! persistence. Used by tests and by single-process deployments that can
//! afford to lose sessions on restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use portico_core::{now_millis, SessionId, UserId};
use portico_crypto::SessionKey;

use crate::error::{Result, StoreError};
use crate::traits::{Profile, Role, Session, Store, UpsertOutcome, User, DEFAULT_ROLE_ID};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Sessions indexed by id.
    sessions: HashMap<SessionId, Session>,

    /// Users indexed by id.
    users: BTreeMap<UserId, User>,

    /// Identifier index: identifier -> user id.
    identifiers: HashMap<String, UserId>,

    roles: BTreeMap<i64, Role>,
    profiles: HashMap<UserId, Profile>,
    next_user_id: UserId,
}

impl MemoryStore {
    /// Create a new empty in-memory store with the default role seeded.
    pub fn new() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            DEFAULT_ROLE_ID,
            Role {
                id: DEFAULT_ROLE_ID,
                name: "user".to_string(),
                description: "Default role".to_string(),
            },
        );
        Self {
            inner: RwLock::new(MemoryStoreInner {
                sessions: HashMap::new(),
                users: BTreeMap::new(),
                identifiers: HashMap::new(),
                roles,
                profiles: HashMap::new(),
                next_user_id: 1,
            }),
        }
    }

    // A panic while holding the lock cannot leave a half-written row behind:
    // every mutation below is a single map operation.
    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_session(&self, id: &SessionId, key: &SessionKey) -> Result<Session> {
        let mut inner = self.write();
        if inner.sessions.contains_key(id) {
            return Err(StoreError::DuplicateSession(id.short().to_string()));
        }
        let session = Session::new(id.clone(), key.clone(), now_millis());
        inner.sessions.insert(id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.read().sessions.get(id).cloned())
    }

    async fn rotate_key(&self, id: &SessionId, key: &SessionKey) -> Result<Session> {
        let mut inner = self.write();
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", id.short())))?;
        session.key = key.clone();
        session.last_used_at = now_millis();
        Ok(session.clone())
    }

    async fn upsert_session_key(
        &self,
        id: &SessionId,
        key: &SessionKey,
    ) -> Result<UpsertOutcome> {
        let mut inner = self.write();
        let now = now_millis();
        match inner.sessions.get_mut(id) {
            Some(session) => {
                session.key = key.clone();
                session.last_used_at = now;
                Ok(UpsertOutcome::Rotated)
            }
            None => {
                inner
                    .sessions
                    .insert(id.clone(), Session::new(id.clone(), key.clone(), now));
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn set_login_state(
        &self,
        id: &SessionId,
        user_id: Option<UserId>,
        logged_in: bool,
    ) -> Result<bool> {
        let mut inner = self.write();
        match inner.sessions.get_mut(id) {
            Some(session) => {
                session.user_id = user_id;
                session.logged_in = logged_in;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_session(&self, id: &SessionId) -> Result<bool> {
        let mut inner = self.write();
        match inner.sessions.get_mut(id) {
            Some(session) => {
                session.last_used_at = now_millis();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn expire_sessions(&self, idle_cutoff_ms: i64) -> Result<usize> {
        let mut inner = self.write();
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, session| session.last_used_at >= idle_cutoff_ms);
        Ok(before - inner.sessions.len())
    }

    async fn add_user(&self, identifier: &str, password_hash: &str, role_id: i64) -> Result<User> {
        let mut inner = self.write();
        if inner.identifiers.contains_key(identifier) {
            return Err(StoreError::DuplicateUser(identifier.to_string()));
        }
        let id = inner.next_user_id;
        inner.next_user_id += 1;

        let user = User {
            id,
            identifier: identifier.to_string(),
            password_hash: password_hash.to_string(),
            role_id,
            preferences: serde_json::Value::Object(Default::default()),
        };
        inner.identifiers.insert(user.identifier.clone(), id);
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let inner = self.read();
        Ok(inner
            .identifiers
            .get(identifier)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn add_role(&self, name: &str, description: &str) -> Result<Role> {
        let mut inner = self.write();
        let id = inner.roles.keys().next_back().map_or(0, |max| max + 1);
        let role = Role {
            id,
            name: name.to_string(),
            description: description.to_string(),
        };
        inner.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn get_role_name(&self, role_id: i64) -> Result<Option<String>> {
        Ok(self.read().roles.get(&role_id).map(|r| r.name.clone()))
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        Ok(self.read().profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.write().profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_crypto::generate_session_id;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let store = MemoryStore::new();
        let id = generate_session_id();
        let key = SessionKey::generate();

        let created = store.create_session(&id, &key).await.unwrap();
        assert_eq!(created.user_id, None);
        assert!(!created.logged_in);

        let fetched = store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(fetched.key, key);
    }

    #[tokio::test]
    async fn test_expire_keeps_recent_sessions() {
        let store = MemoryStore::new();
        let old = generate_session_id();
        store.create_session(&old, &SessionKey::generate()).await.unwrap();

        let cutoff = now_millis() + 1;
        let fresh = generate_session_id();
        {
            let mut inner = store.write();
            let mut session = Session::new(fresh.clone(), SessionKey::generate(), cutoff + 10);
            session.created_at = cutoff;
            inner.sessions.insert(fresh.clone(), session);
        }

        assert_eq!(store.expire_sessions(cutoff).await.unwrap(), 1);
        assert!(store.get_session(&old).await.unwrap().is_none());
        assert!(store.get_session(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_role_takes_next_id() {
        let store = MemoryStore::new();
        let admin = store.add_role("admin", "Administrators").await.unwrap();
        assert_eq!(admin.id, 1);
        assert_eq!(store.get_role_name(0).await.unwrap().as_deref(), Some("user"));
        assert_eq!(store.get_role_name(1).await.unwrap().as_deref(), Some("admin"));
    }
}
