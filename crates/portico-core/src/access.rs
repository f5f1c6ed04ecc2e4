//! Access rules and the access evaluator.
//!
//! Rules are keyed by logical route name and loaded once at startup. The
//! evaluator is a pure function of a rule and an [`AccessSnapshot`]:
//!
//! 1. No rule for the route: open access.
//! 2. `login_required` and not logged in: denied with [`LOGIN_REQUIRED`].
//! 3. `roles_allowed` must admit the snapshot's role.
//!
//! A `roles_allowed` value of any shape other than `"*"`, a role name or a
//! list of role names is kept as [`RolesAllowed::Malformed`] and denies.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::snapshot::AccessSnapshot;

/// Denial reason that sends the client to the login page.
pub const LOGIN_REQUIRED: &str = "login_required";

/// Which roles may reach a route.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RolesAllowed {
    /// `"*"`: every role, including anonymous users.
    #[default]
    Any,
    /// A single role name that must match exactly.
    One(String),
    /// An ordered set of role names.
    Set(Vec<String>),
    /// Anything else; the raw value is kept for diagnostics.
    Malformed(String),
}

impl RolesAllowed {
    /// Classify a raw configuration value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) if s == "*" => RolesAllowed::Any,
            Value::String(s) => RolesAllowed::One(s.clone()),
            Value::Array(items) => {
                let names: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_owned))
                    .collect();
                match names {
                    Some(names) => RolesAllowed::Set(names),
                    None => RolesAllowed::Malformed(value.to_string()),
                }
            }
            other => RolesAllowed::Malformed(other.to_string()),
        }
    }

    /// Check whether `role` is admitted.
    ///
    /// `Malformed` never admits anyone.
    pub fn permits(&self, role: Option<&str>) -> bool {
        match self {
            RolesAllowed::Any => true,
            RolesAllowed::One(name) => role == Some(name.as_str()),
            RolesAllowed::Set(names) => role.is_some_and(|r| names.iter().any(|n| n == r)),
            RolesAllowed::Malformed(_) => false,
        }
    }
}

impl<'de> Deserialize<'de> for RolesAllowed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(RolesAllowed::from_value(&value))
    }
}

impl Serialize for RolesAllowed {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RolesAllowed::Any => serializer.serialize_str("*"),
            RolesAllowed::One(name) => serializer.serialize_str(name),
            RolesAllowed::Set(names) => names.serialize(serializer),
            RolesAllowed::Malformed(raw) => serializer.serialize_str(raw),
        }
    }
}

/// Access rule for one logical route.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessRule {
    #[serde(default)]
    pub login_required: bool,
    #[serde(default)]
    pub roles_allowed: RolesAllowed,
}

impl AccessRule {
    /// Evaluate this rule against a snapshot.
    pub fn evaluate(&self, snapshot: &AccessSnapshot) -> AccessDecision {
        if self.login_required && !snapshot.logged_in {
            return AccessDecision::LoginRequired;
        }

        if let RolesAllowed::Malformed(_) = self.roles_allowed {
            return AccessDecision::Misconfigured;
        }

        if !self.roles_allowed.permits(snapshot.role()) {
            return AccessDecision::RoleDenied(snapshot.role.clone());
        }

        AccessDecision::Granted
    }
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The route has no rules.
    Open,
    /// Every rule passed.
    Granted,
    /// The route needs a logged-in user.
    LoginRequired,
    /// The snapshot's role is not admitted.
    RoleDenied(Option<String>),
    /// The rule's `roles_allowed` has an unusable shape.
    Misconfigured,
}

impl AccessDecision {
    /// Whether the request may proceed.
    pub fn allowed(&self) -> bool {
        matches!(self, AccessDecision::Open | AccessDecision::Granted)
    }

    /// Whether the denial should redirect to the login page.
    pub fn is_login_required(&self) -> bool {
        matches!(self, AccessDecision::LoginRequired)
    }

    /// Human-readable reason. `"login_required"` is matched by the router.
    pub fn reason(&self) -> Cow<'static, str> {
        match self {
            AccessDecision::Open => Cow::Borrowed("open access"),
            AccessDecision::Granted => Cow::Borrowed("access granted"),
            AccessDecision::LoginRequired => Cow::Borrowed(LOGIN_REQUIRED),
            AccessDecision::RoleDenied(role) => Cow::Owned(format!(
                "role {} not allowed",
                role.as_deref().unwrap_or("<none>")
            )),
            AccessDecision::Misconfigured => {
                Cow::Borrowed("invalid roles_allowed configuration")
            }
        }
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

/// The rule set for every route, keyed by route name.
#[derive(Debug, Clone, Default)]
pub struct AccessRules {
    rules: HashMap<String, AccessRule>,
}

impl AccessRules {
    /// Create an empty rule set (every route open).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for a route.
    pub fn insert(&mut self, route: impl Into<String>, rule: AccessRule) {
        self.rules.insert(route.into(), rule);
    }

    /// Get the rule for a route.
    pub fn get(&self, route: &str) -> Option<&AccessRule> {
        self.rules.get(route)
    }

    /// Number of routes with rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no route has rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decide whether `snapshot` may reach `route`.
    pub fn can_access(&self, route: &str, snapshot: &AccessSnapshot) -> AccessDecision {
        match self.rules.get(route) {
            None => AccessDecision::Open,
            Some(rule) => rule.evaluate(snapshot),
        }
    }
}

impl FromIterator<(String, AccessRule)> for AccessRules {
    fn from_iter<I: IntoIterator<Item = (String, AccessRule)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
