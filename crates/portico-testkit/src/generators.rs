//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::Value;

use portico_core::{AccessRule, AccessSnapshot, RolesAllowed, SessionId, SnapshotStatus, UserId};
use portico_crypto::SessionKey;

/// Generate a random session key.
pub fn session_key() -> impl Strategy<Value = SessionKey> {
    any::<[u8; 32]>().prop_map(SessionKey::from_bytes)
}

/// Generate a well-formed session id.
pub fn session_id() -> impl Strategy<Value = SessionId> {
    any::<[u8; 32]>().prop_map(|bytes| SessionId::from_entropy(&bytes))
}

/// Generate a role name from a small pool, so rules and snapshots collide.
pub fn role_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("user".to_string()),
        Just("admin".to_string()),
        Just("editor".to_string()),
        "[a-z]{1,8}",
    ]
}

/// Generate any shape of `roles_allowed`.
pub fn roles_allowed() -> impl Strategy<Value = RolesAllowed> {
    prop_oneof![
        Just(RolesAllowed::Any),
        role_name().prop_map(RolesAllowed::One),
        prop::collection::vec(role_name(), 0..4).prop_map(RolesAllowed::Set),
        any::<i64>().prop_map(|n| RolesAllowed::Malformed(n.to_string())),
    ]
}

/// Generate an access rule.
pub fn access_rule() -> impl Strategy<Value = AccessRule> {
    (any::<bool>(), roles_allowed()).prop_map(|(login_required, roles_allowed)| AccessRule {
        login_required,
        roles_allowed,
    })
}

/// Generate a snapshot, either granted or stopped at some error.
pub fn access_snapshot() -> impl Strategy<Value = AccessSnapshot> {
    prop_oneof![
        (1..1_000 as UserId, role_name())
            .prop_map(|(user_id, role)| AccessSnapshot::granted(user_id, role)),
        prop_oneof![
            Just("No session id"),
            Just("Session not found"),
            Just("User not logged in"),
            Just("User not found"),
            Just("Role not found"),
        ]
        .prop_map(AccessSnapshot::error),
    ]
}

/// Generate an arbitrary JSON value of bounded depth.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        ".{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Whether a snapshot resolved all the way to a role.
pub fn is_granted(snapshot: &AccessSnapshot) -> bool {
    snapshot.status == SnapshotStatus::Success
}
