use chrono::Utc;
use common::model::audit::{Actor, AuditAction, AuditLogEntry, NewAuditEntry};
use common::model::user::{UserAccount, UserInput};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{json, Map};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, Store};
use crate::error::ApiError;

const SESSION_ENTITY: &str = "session";

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

struct UserRow {
    id: String,
    email: String,
    full_name: String,
    role: String,
    active: bool,
    last_login: Option<String>,
}

impl UserRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(UserRow {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            role: row.get(3)?,
            active: row.get(4)?,
            last_login: row.get(5)?,
        })
    }

    fn into_account(self) -> Result<UserAccount, ApiError> {
        Ok(UserAccount {
            role: self.role.parse().map_err(ApiError::Internal)?,
            last_login: self
                .last_login
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            active: self.active,
        })
    }
}

fn select_user(conn: &Connection, email: &str) -> Result<Option<UserAccount>, ApiError> {
    conn.query_row(
        "SELECT id, email, full_name, role, active, last_login FROM users WHERE email = ?1",
        params![email],
        UserRow::from_row,
    )
    .optional()?
    .map(UserRow::into_account)
    .transpose()
}

impl Store {
    /// Creates the user or updates the existing account with the same email.
    pub fn upsert_user(&self, input: UserInput) -> Result<UserAccount, ApiError> {
        let email = normalize_email(&input.email);
        if email.is_empty() {
            return Err(ApiError::Validation("user email must not be empty".into()));
        }
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO users (id, email, full_name, role, active, last_login) \
             VALUES (?1, ?2, ?3, ?4, ?5, NULL) \
             ON CONFLICT(email) DO UPDATE SET \
             full_name = excluded.full_name, role = excluded.role, active = excluded.active",
            params![
                Uuid::new_v4().to_string(),
                email,
                input.full_name.trim(),
                input.role.as_str(),
                input.active,
            ],
        )?;
        let account = select_user(&conn, &email)?
            .ok_or_else(|| ApiError::Internal(format!("user {} vanished after save", email)))?;
        info!("User {} saved with role {}", account.email, account.role.as_str());
        Ok(account)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, ApiError> {
        let conn = self.connect()?;
        select_user(&conn, &normalize_email(email))
    }

    pub fn list_users(&self) -> Result<Vec<UserAccount>, ApiError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, email, full_name, role, active, last_login FROM users ORDER BY email",
        )?;
        let rows = stmt
            .query_map([], UserRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(UserRow::into_account).collect()
    }

    /// Stamps `last_login` with the current time. Returns false for unknown emails.
    pub fn touch_last_login(&self, email: &str) -> Result<bool, ApiError> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE users SET last_login = ?1 WHERE email = ?2",
            params![format_timestamp(&Utc::now()), normalize_email(email)],
        )?;
        Ok(changed > 0)
    }

    /// Records a login, logout or login attempt. A LOGIN also stamps `last_login`.
    pub fn log_session_event(
        &self,
        event: AuditAction,
        email: &str,
        actor: &Actor,
    ) -> Result<AuditLogEntry, ApiError> {
        if !event.is_session_event() {
            return Err(ApiError::Validation(format!(
                "'{}' is not a session event",
                event.as_str()
            )));
        }
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ApiError::Validation("missing parameter 'email'".into()));
        }
        if event == AuditAction::Login && !self.touch_last_login(&email)? {
            info!("Login for {} who has no user account", email);
        }

        let mut details = Map::new();
        details.insert("email".to_string(), json!(email));
        self.append_audit(
            actor,
            NewAuditEntry {
                action: event,
                entity_type: SESSION_ENTITY.to_string(),
                entity_id: email,
                details,
            },
        )
    }
}
