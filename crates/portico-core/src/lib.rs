//! # Portico Core
//!
//! Pure primitives for Portico: session identity, access rules, access
//! snapshots, request classification and the application manifest.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! a plain decision over data handed in by the caller.
//!
//! ## Key Types
//!
//! - [`SessionId`] - Opaque, URL-safe session token
//! - [`AccessRules`] - Per-route access rules and the access evaluator
//! - [`AccessSnapshot`] - Per-request view of a user's login and role state
//! - [`RequestTarget`] - Classification of an inbound request path
//! - [`Manifest`] - The application manifest (routes, auth, plugins)

pub mod access;
pub mod error;
pub mod manifest;
pub mod route;
pub mod snapshot;
pub mod types;

pub use access::{AccessDecision, AccessRule, AccessRules, RolesAllowed, LOGIN_REQUIRED};
pub use error::{CoreError, Result};
pub use manifest::{AuthSection, Manifest, RouteTable, ServerSection};
pub use route::{is_safe_relative_path, FileDisposition, RequestTarget};
pub use snapshot::{AccessSnapshot, SnapshotStatus};
pub use types::{now_millis, SessionId, UserId, SESSION_COOKIE, SESSION_KEY_LEN};
