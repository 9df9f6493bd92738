use chrono::Utc;
use common::model::audit::{Actor, AuditLogEntry, NewAuditEntry};
use log::debug;
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, sql_limit, Store};
use crate::error::ApiError;

/// Appends one entry on `conn`, which may be an open transaction.
pub(crate) fn insert_audit(
    conn: &Connection,
    actor: &Actor,
    entry: NewAuditEntry,
) -> Result<AuditLogEntry, ApiError> {
    let logged = AuditLogEntry {
        id: Uuid::new_v4().to_string(),
        action: entry.action,
        entity_type: entry.entity_type,
        entity_id: entry.entity_id,
        user_id: actor.id.clone(),
        user_email: actor.email.clone(),
        user_role: actor.role,
        timestamp: Utc::now(),
        details: entry.details,
    };
    conn.execute(
        "INSERT INTO audit_log (id, action, entity_type, entity_id, user_id, user_email, \
         user_role, timestamp, details) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            logged.id,
            logged.action.as_str(),
            logged.entity_type,
            logged.entity_id,
            logged.user_id,
            logged.user_email,
            logged.user_role.as_str(),
            format_timestamp(&logged.timestamp),
            serde_json::to_string(&logged.details)?,
        ],
    )?;
    debug!(
        "Audit {} on {} {} by {}",
        logged.action.as_str(),
        logged.entity_type,
        logged.entity_id,
        logged.user_id
    );
    Ok(logged)
}

struct AuditRow {
    id: String,
    action: String,
    entity_type: String,
    entity_id: String,
    user_id: String,
    user_email: String,
    user_role: String,
    timestamp: String,
    details: String,
}

impl AuditRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AuditRow {
            id: row.get(0)?,
            action: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            user_id: row.get(4)?,
            user_email: row.get(5)?,
            user_role: row.get(6)?,
            timestamp: row.get(7)?,
            details: row.get(8)?,
        })
    }

    fn into_entry(self) -> Result<AuditLogEntry, ApiError> {
        let details = match serde_json::from_str(&self.details)? {
            Value::Object(map) => map,
            other => {
                return Err(ApiError::Internal(format!(
                    "audit entry {} has non-object details: {}",
                    self.id, other
                )))
            }
        };
        Ok(AuditLogEntry {
            action: self.action.parse().map_err(ApiError::Internal)?,
            user_role: self.user_role.parse().map_err(ApiError::Internal)?,
            timestamp: parse_timestamp(&self.timestamp)?,
            details,
            id: self.id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            user_id: self.user_id,
            user_email: self.user_email,
        })
    }
}

impl Store {
    pub fn append_audit(
        &self,
        actor: &Actor,
        entry: NewAuditEntry,
    ) -> Result<AuditLogEntry, ApiError> {
        let conn = self.connect()?;
        insert_audit(&conn, actor, entry)
    }

    /// Audit entries newest first, optionally narrowed to one entity.
    pub fn list_audit(
        &self,
        limit: Option<usize>,
        entity_id: Option<&str>,
    ) -> Result<Vec<AuditLogEntry>, ApiError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, action, entity_type, entity_id, user_id, user_email, user_role, \
             timestamp, details FROM audit_log \
             WHERE (?1 IS NULL OR entity_id = ?1) \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![entity_id, sql_limit(limit)], AuditRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(AuditRow::into_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use common::model::audit::AuditAction;
    use common::model::user::Role;
    use serde_json::{json, Map};

    fn admin() -> Actor {
        Actor {
            id: "u-9".into(),
            email: "head@example.org".into(),
            role: Role::Admin,
        }
    }

    fn entry(entity_id: &str) -> NewAuditEntry {
        let mut details = Map::new();
        details.insert("source".into(), json!("test"));
        NewAuditEntry {
            action: AuditAction::Login,
            entity_type: "session".into(),
            entity_id: entity_id.into(),
            details,
        }
    }

    #[test]
    fn test_append_and_filter_by_entity() {
        let (_dir, store) = temp_store();
        store.append_audit(&admin(), entry("a")).unwrap();
        store.append_audit(&admin(), entry("b")).unwrap();
        store.append_audit(&admin(), entry("a")).unwrap();

        assert_eq!(store.list_audit(None, None).unwrap().len(), 3);
        let only_a = store.list_audit(None, Some("a")).unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|e| e.entity_id == "a"));
        assert_eq!(only_a[0].user_role, Role::Admin);
        assert_eq!(only_a[0].details["source"], json!("test"));
        assert_eq!(store.list_audit(Some(1), None).unwrap()[0].entity_id, "a");
    }

    #[test]
    fn test_audit_log_rejects_update_and_delete() {
        let (_dir, store) = temp_store();
        store.append_audit(&admin(), entry("a")).unwrap();
        let conn = store.connect().unwrap();
        assert!(conn
            .execute("UPDATE audit_log SET user_id = 'someone-else'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM audit_log", []).is_err());
        assert_eq!(store.list_audit(None, None).unwrap()[0].user_id, "u-9");
    }
}
