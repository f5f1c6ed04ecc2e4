//! Access snapshot: the per-request view of who is asking.
//!
//! A snapshot is derived from the session store on every request and never
//! persisted. Resolution never fails: every problem on the way from session
//! to role ends up as an [`SnapshotStatus::Error`] with a distinct message.

use serde::Serialize;

use crate::types::UserId;

/// Outcome of resolving a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum SnapshotStatus {
    Success,
    Error(String),
}

/// Login and role state of the requesting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessSnapshot {
    pub user_id: Option<UserId>,
    #[serde(flatten)]
    pub status: SnapshotStatus,
    pub role: Option<String>,
    pub logged_in: bool,
}

impl AccessSnapshot {
    /// A logged-in user with a resolved role.
    pub fn granted(user_id: UserId, role: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            status: SnapshotStatus::Success,
            role: Some(role.into()),
            logged_in: true,
        }
    }

    /// An anonymous snapshot carrying the reason resolution stopped.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            user_id: None,
            status: SnapshotStatus::Error(message.into()),
            role: None,
            logged_in: false,
        }
    }

    /// The error message, if resolution stopped early.
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            SnapshotStatus::Success => None,
            SnapshotStatus::Error(message) => Some(message),
        }
    }

    /// The resolved role name.
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }
}

impl Default for AccessSnapshot {
    fn default() -> Self {
        Self::error("No session id")
    }
}
