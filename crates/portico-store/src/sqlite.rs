//! SQLite implementation of the Store trait.
//!
//! The primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use portico_core::{now_millis, SessionId, UserId};
use portico_crypto::SessionKey;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Profile, Role, Session, Store, UpsertOutcome, User};

const SESSION_COLUMNS: &str = "id, key, user_id, logged_in, created_at, last_used_at";
const USER_COLUMNS: &str = "id, identifier, password_hash, role_id, preferences";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations run on the blocking pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await?
    }
}

fn conversion_error<E>(column: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(err))
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let id: String = row.get("id")?;
    let key: Vec<u8> = row.get("key")?;
    let logged_in: i64 = row.get("logged_in")?;

    Ok(Session {
        id: SessionId::parse(&id).map_err(|e| conversion_error(0, Type::Text, e))?,
        key: SessionKey::from_slice(&key).map_err(|e| conversion_error(1, Type::Blob, e))?,
        user_id: row.get("user_id")?,
        logged_in: logged_in != 0,
        created_at: row.get("created_at")?,
        last_used_at: row.get("last_used_at")?,
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let preferences: String = row.get("preferences")?;
    Ok(User {
        id: row.get("id")?,
        identifier: row.get("identifier")?,
        password_hash: row.get("password_hash")?,
        role_id: row.get("role_id")?,
        preferences: serde_json::from_str(&preferences)
            .map_err(|e| conversion_error(4, Type::Text, e))?,
    })
}

fn select_session(conn: &Connection, id: &str) -> rusqlite::Result<Option<Session>> {
    conn.query_row(
        &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
        params![id],
        row_to_session,
    )
    .optional()
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_session(&self, id: &SessionId, key: &SessionKey) -> Result<Session> {
        let session = Session::new(id.clone(), key.clone(), now_millis());

        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO sessions (id, key, user_id, logged_in, created_at, last_used_at)
                 VALUES (?1, ?2, NULL, 0, ?3, ?3)",
                params![
                    session.id.as_str(),
                    session.key.as_bytes().as_slice(),
                    session.created_at,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::DuplicateSession(session.id.short().to_string()));
            }
            Ok(session)
        })
        .await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let id = id.clone();
        self.run(move |conn| Ok(select_session(conn, id.as_str())?))
            .await
    }

    async fn rotate_key(&self, id: &SessionId, key: &SessionKey) -> Result<Session> {
        let id = id.clone();
        let key = key.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE sessions SET key = ?2, last_used_at = ?3 WHERE id = ?1",
                params![id.as_str(), key.as_bytes().as_slice(), now_millis()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("session {}", id.short())));
            }
            let session = select_session(&tx, id.as_str())?
                .ok_or_else(|| StoreError::NotFound(format!("session {}", id.short())))?;
            tx.commit()?;
            Ok(session)
        })
        .await
    }

    async fn upsert_session_key(
        &self,
        id: &SessionId,
        key: &SessionKey,
    ) -> Result<UpsertOutcome> {
        let id = id.clone();
        let key = key.clone();

        self.run(move |conn| {
            let now = now_millis();
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE sessions SET key = ?2, last_used_at = ?3 WHERE id = ?1",
                params![id.as_str(), key.as_bytes().as_slice(), now],
            )?;
            let outcome = if updated > 0 {
                UpsertOutcome::Rotated
            } else {
                tx.execute(
                    "INSERT INTO sessions (id, key, user_id, logged_in, created_at, last_used_at)
                     VALUES (?1, ?2, NULL, 0, ?3, ?3)",
                    params![id.as_str(), key.as_bytes().as_slice(), now],
                )?;
                UpsertOutcome::Created
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn set_login_state(
        &self,
        id: &SessionId,
        user_id: Option<UserId>,
        logged_in: bool,
    ) -> Result<bool> {
        let id = id.clone();
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE sessions SET user_id = ?2, logged_in = ?3 WHERE id = ?1",
                params![id.as_str(), user_id, logged_in as i64],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    async fn touch_session(&self, id: &SessionId) -> Result<bool> {
        let id = id.clone();
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE sessions SET last_used_at = ?2 WHERE id = ?1",
                params![id.as_str(), now_millis()],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    async fn expire_sessions(&self, idle_cutoff_ms: i64) -> Result<usize> {
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM sessions WHERE last_used_at < ?1",
                params![idle_cutoff_ms],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn add_user(&self, identifier: &str, password_hash: &str, role_id: i64) -> Result<User> {
        let identifier = identifier.to_string();
        let password_hash = password_hash.to_string();

        self.run(move |conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT id FROM users WHERE identifier = ?1",
                    params![identifier],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::DuplicateUser(identifier));
            }

            conn.execute(
                "INSERT INTO users (identifier, password_hash, role_id, preferences, created_at)
                 VALUES (?1, ?2, ?3, '{}', ?4)",
                params![identifier, password_hash, role_id, now_millis()],
            )?;

            Ok(User {
                id: conn.last_insert_rowid(),
                identifier,
                password_hash,
                role_id,
                preferences: serde_json::Value::Object(Default::default()),
            })
        })
        .await
    }

    async fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let identifier = identifier.to_string();
        self.run(move |conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE identifier = ?1", USER_COLUMNS),
                    params![identifier],
                    row_to_user,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.run(move |conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                    params![id],
                    row_to_user,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn add_role(&self, name: &str, description: &str) -> Result<Role> {
        let name = name.to_string();
        let description = description.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let id: i64 = tx.query_row(
                "SELECT COALESCE(MAX(id), -1) + 1 FROM roles",
                [],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO roles (id, name, description) VALUES (?1, ?2, ?3)",
                params![id, name, description],
            )?;
            tx.commit()?;
            Ok(Role {
                id,
                name,
                description,
            })
        })
        .await
    }

    async fn get_role_name(&self, role_id: i64) -> Result<Option<String>> {
        self.run(move |conn| {
            let name = conn
                .query_row(
                    "SELECT name FROM roles WHERE id = ?1",
                    params![role_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(name)
        })
        .await
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        self.run(move |conn| {
            let profile = conn
                .query_row(
                    "SELECT user_id, name, display_name, email, phone FROM profiles WHERE user_id = ?1",
                    params![user_id],
                    |row| {
                        Ok(Profile {
                            user_id: row.get(0)?,
                            name: row.get(1)?,
                            display_name: row.get(2)?,
                            email: row.get(3)?,
                            phone: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(profile)
        })
        .await
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let profile = profile.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, name, display_name, email, phone)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    name = excluded.name,
                    display_name = excluded.display_name,
                    email = excluded.email,
                    phone = excluded.phone",
                params![
                    profile.user_id,
                    profile.name,
                    profile.display_name,
                    profile.email,
                    profile.phone,
                ],
            )?;
            Ok(())
        })
        .await
    }
}
