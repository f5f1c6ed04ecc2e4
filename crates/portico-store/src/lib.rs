//! # Portico Store
//!
//! Storage abstraction for Portico sessions, users, roles and profiles.
//! Provides a trait-based interface with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The server is storage-agnostic: everything it persists goes through the
//! [`Store`] trait. The primary implementation is [`SqliteStore`], with
//! [`MemoryStore`] for tests and single-process deployments.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage
//! - [`Session`] - A session row: id, symmetric key, login state
//! - [`UpsertOutcome`] - Whether a handshake created or rotated a session
//!
//! ## Usage
//!
//! ```rust,no_run
//! use portico_crypto::{generate_session_id, SessionKey};
//! use portico_store::{SqliteStore, Store, UpsertOutcome};
//!
//! async fn example() {
//!     let store = SqliteStore::open("portico.db").unwrap();
//!
//!     let id = generate_session_id();
//!     let outcome = store
//!         .upsert_session_key(&id, &SessionKey::generate())
//!         .await
//!         .unwrap();
//!     assert_eq!(outcome, UpsertOutcome::Created);
//!
//!     // Anonymous until login
//!     let snapshot = store.resolve_access_snapshot(Some(id.as_str())).await;
//!     assert!(!snapshot.logged_in);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic rotation**: `upsert_session_key` is one transaction, so a
//!   concurrent reader sees the old key or the new key, never neither
//! - **Login survives rotation**: re-running the handshake keeps `user_id`
//!   and `logged_in`
//! - **Seeded role**: role id 0 is `"user"`, the default for new accounts

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Profile, Role, Session, Store, UpsertOutcome, User, DEFAULT_ROLE_ID};
