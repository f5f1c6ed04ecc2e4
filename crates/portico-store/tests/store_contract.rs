//! Contract tests run against every Store backend.

use portico_core::{now_millis, SnapshotStatus};
use portico_crypto::{generate_session_id, SessionKey};
use portico_store::{
    MemoryStore, Profile, SqliteStore, Store, StoreError, UpsertOutcome, DEFAULT_ROLE_ID,
};

fn backends() -> Vec<(&'static str, Box<dyn Store>)> {
    vec![
        ("memory", Box::new(MemoryStore::new())),
        ("sqlite", Box::new(SqliteStore::open_memory().unwrap())),
    ]
}

#[tokio::test]
async fn test_create_session_rejects_duplicates() {
    for (name, store) in backends() {
        let id = generate_session_id();
        store.create_session(&id, &SessionKey::generate()).await.unwrap();

        let again = store.create_session(&id, &SessionKey::generate()).await;
        assert!(
            matches!(again, Err(StoreError::DuplicateSession(_))),
            "{}: duplicate session accepted",
            name
        );
    }
}

#[tokio::test]
async fn test_rotate_missing_session_is_not_found() {
    for (name, store) in backends() {
        let result = store
            .rotate_key(&generate_session_id(), &SessionKey::generate())
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))), "{}", name);
    }
}

#[tokio::test]
async fn test_upsert_creates_then_rotates() {
    for (name, store) in backends() {
        let id = generate_session_id();
        let first = SessionKey::generate();
        let second = SessionKey::generate();

        assert_eq!(
            store.upsert_session_key(&id, &first).await.unwrap(),
            UpsertOutcome::Created,
            "{}",
            name
        );
        assert_eq!(
            store.upsert_session_key(&id, &second).await.unwrap(),
            UpsertOutcome::Rotated,
            "{}",
            name
        );

        let session = store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(session.key, second, "{}: second key must win", name);
        assert_ne!(session.key, first);
    }
}

#[tokio::test]
async fn test_rotation_keeps_login_state() {
    for (name, store) in backends() {
        let id = generate_session_id();
        store.create_session(&id, &SessionKey::generate()).await.unwrap();
        let user = store.add_user("alice", "hash", DEFAULT_ROLE_ID).await.unwrap();
        assert!(store.set_login_state(&id, Some(user.id), true).await.unwrap());

        let rotated = store.rotate_key(&id, &SessionKey::generate()).await.unwrap();
        assert_eq!(rotated.user_id, Some(user.id), "{}", name);
        assert!(rotated.logged_in, "{}", name);
    }
}

#[tokio::test]
async fn test_set_login_state_on_unknown_session() {
    for (name, store) in backends() {
        let changed = store
            .set_login_state(&generate_session_id(), Some(1), true)
            .await
            .unwrap();
        assert!(!changed, "{}", name);
        assert!(!store.touch_session(&generate_session_id()).await.unwrap());
    }
}

#[tokio::test]
async fn test_expire_sessions_by_idle_cutoff() {
    for (name, store) in backends() {
        let stale = generate_session_id();
        store.create_session(&stale, &SessionKey::generate()).await.unwrap();

        // Nothing is older than an hour ago.
        assert_eq!(store.expire_sessions(now_millis() - 3_600_000).await.unwrap(), 0);

        // Everything is older than the future.
        let removed = store.expire_sessions(now_millis() + 1_000).await.unwrap();
        assert_eq!(removed, 1, "{}", name);
        assert!(store.get_session(&stale).await.unwrap().is_none(), "{}", name);
    }
}

#[tokio::test]
async fn test_users_and_roles() {
    for (name, store) in backends() {
        let user = store.add_user("bob", "$argon2id$...", DEFAULT_ROLE_ID).await.unwrap();
        assert!(matches!(
            store.add_user("bob", "other", DEFAULT_ROLE_ID).await,
            Err(StoreError::DuplicateUser(_))
        ));

        let by_name = store.get_user_by_identifier("bob").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id, "{}", name);
        assert_eq!(by_name.password_hash, "$argon2id$...");
        assert!(store.get_user_by_identifier("carol").await.unwrap().is_none());

        let admin = store.add_role("admin", "Administrators").await.unwrap();
        assert_ne!(admin.id, DEFAULT_ROLE_ID);
        assert_eq!(
            store.get_role_name(admin.id).await.unwrap().as_deref(),
            Some("admin")
        );
        assert_eq!(
            store.get_role_name(DEFAULT_ROLE_ID).await.unwrap().as_deref(),
            Some("user")
        );
    }
}

#[tokio::test]
async fn test_profile_upsert_replaces() {
    for (name, store) in backends() {
        let user = store.add_user("dana", "hash", DEFAULT_ROLE_ID).await.unwrap();
        assert!(store.get_profile(user.id).await.unwrap().is_none());

        let mut profile = Profile {
            user_id: user.id,
            name: "Dana".into(),
            display_name: None,
            email: Some("dana@example.com".into()),
            phone: None,
        };
        store.upsert_profile(&profile).await.unwrap();

        profile.display_name = Some("D".into());
        store.upsert_profile(&profile).await.unwrap();

        assert_eq!(store.get_profile(user.id).await.unwrap(), Some(profile), "{}", name);
    }
}

#[tokio::test]
async fn test_snapshot_messages() {
    for (name, store) in backends() {
        let error = |s: &portico_core::AccessSnapshot| s.error_message().map(str::to_string);

        let snapshot = store.resolve_access_snapshot(None).await;
        assert_eq!(error(&snapshot).as_deref(), Some("No session id"), "{}", name);

        let snapshot = store.resolve_access_snapshot(Some("not;a;token")).await;
        assert_eq!(error(&snapshot).as_deref(), Some("Session not found"));

        let id = generate_session_id();
        let snapshot = store.resolve_access_snapshot(Some(id.as_str())).await;
        assert_eq!(error(&snapshot).as_deref(), Some("Session not found"));

        store.create_session(&id, &SessionKey::generate()).await.unwrap();
        let snapshot = store.resolve_access_snapshot(Some(id.as_str())).await;
        assert_eq!(error(&snapshot).as_deref(), Some("User not logged in"));

        store.set_login_state(&id, Some(9_999), true).await.unwrap();
        let snapshot = store.resolve_access_snapshot(Some(id.as_str())).await;
        assert_eq!(error(&snapshot).as_deref(), Some("User not found"));

        let orphan = store.add_user("orphan", "hash", 42).await.unwrap();
        store.set_login_state(&id, Some(orphan.id), true).await.unwrap();
        let snapshot = store.resolve_access_snapshot(Some(id.as_str())).await;
        assert_eq!(error(&snapshot).as_deref(), Some("Role not found"));

        let user = store.add_user("eve", "hash", DEFAULT_ROLE_ID).await.unwrap();
        store.set_login_state(&id, Some(user.id), true).await.unwrap();
        let snapshot = store.resolve_access_snapshot(Some(id.as_str())).await;
        assert_eq!(snapshot.status, SnapshotStatus::Success, "{}", name);
        assert_eq!(snapshot.user_id, Some(user.id));
        assert_eq!(snapshot.role(), Some("user"));
        assert!(snapshot.logged_in);

        // Logout keeps the session but drops the user.
        store.set_login_state(&id, None, false).await.unwrap();
        let snapshot = store.resolve_access_snapshot(Some(id.as_str())).await;
        assert_eq!(error(&snapshot).as_deref(), Some("User not logged in"));
    }
}
