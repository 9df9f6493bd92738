use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::model::user::Role;

/// Kind of mutation or session event captured by the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    StatusChange,
    Login,
    Logout,
    LoginAttempt,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::StatusChange => "STATUS_CHANGE",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::LoginAttempt => "LOGIN_ATTEMPT",
        }
    }

    /// Session events are the only actions callers may log directly.
    pub fn is_session_event(&self) -> bool {
        matches!(
            self,
            AuditAction::Login | AuditAction::Logout | AuditAction::LoginAttempt
        )
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            "STATUS_CHANGE" => Ok(AuditAction::StatusChange),
            "LOGIN" => Ok(AuditAction::Login),
            "LOGOUT" => Ok(AuditAction::Logout),
            "LOGIN_ATTEMPT" => Ok(AuditAction::LoginAttempt),
            other => Err(format!("unknown audit action '{}'", other)),
        }
    }
}

/// The user on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl Actor {
    pub fn anonymous() -> Self {
        Actor {
            id: "anonymous".to_string(),
            email: String::new(),
            role: Role::Operator,
        }
    }
}

/// Audit entry before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Map<String, Value>,
}

/// Append-only audit trail row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: String,
    pub user_email: String,
    pub user_role: Role,
    pub timestamp: DateTime<Utc>,
    pub details: Map<String, Value>,
}

/// Field-level `{ field: { before, after } }` diff between two JSON objects.
///
/// Only fields whose value changed are listed. A field missing on one side is
/// reported as `null` on that side.
pub fn field_diff(before: &Map<String, Value>, after: &Map<String, Value>) -> Map<String, Value> {
    let mut diff = Map::new();
    let keys = before.keys().chain(after.keys().filter(|k| !before.contains_key(*k)));
    for key in keys {
        let old = before.get(key).unwrap_or(&Value::Null);
        let new = after.get(key).unwrap_or(&Value::Null);
        if old != new {
            let mut change = Map::new();
            change.insert("before".to_string(), old.clone());
            change.insert("after".to_string(), new.clone());
            diff.insert(key.clone(), Value::Object(change));
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_field_diff_lists_only_changed_fields() {
        let before = object(json!({ "notes": "a", "program": "EO", "mechanical": null }));
        let after = object(json!({ "notes": "b", "program": "EO", "mechanical": "pass" }));
        let diff = field_diff(&before, &after);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff["notes"], json!({ "before": "a", "after": "b" }));
        assert_eq!(diff["mechanical"], json!({ "before": null, "after": "pass" }));
    }

    #[test]
    fn test_field_diff_reports_added_and_removed_fields() {
        let before = object(json!({ "old": 1 }));
        let after = object(json!({ "new": 2 }));
        let diff = field_diff(&before, &after);
        assert_eq!(diff["old"], json!({ "before": 1, "after": null }));
        assert_eq!(diff["new"], json!({ "before": null, "after": 2 }));
    }

    #[test]
    fn test_audit_action_wire_names() {
        assert_eq!(
            serde_json::to_value(AuditAction::StatusChange).unwrap(),
            json!("STATUS_CHANGE")
        );
        assert_eq!(
            "LOGIN_ATTEMPT".parse::<AuditAction>(),
            Ok(AuditAction::LoginAttempt)
        );
        assert!(AuditAction::Logout.is_session_event());
        assert!(!AuditAction::Delete.is_session_event());
    }
}
