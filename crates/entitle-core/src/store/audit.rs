//! Append-only audit streams: validation attempts, configuration changes,
//! module actions. There is no update or delete path.

use rusqlite::{params, Connection};

use super::{format_ts, parse_ts, Store};
use crate::error::{StoreError, StoreResult};
use crate::model::{ConfigChange, ModuleAction, ModuleActionKind, Origin, ValidationAttempt};

pub(crate) fn insert_config_change(conn: &Connection, change: &ConfigChange) -> StoreResult<()> {
    conn.execute(
        r#"
        INSERT INTO config_changes (occurred_at, actor, section, before_json, after_json, result)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            format_ts(change.timestamp),
            change.actor,
            change.section,
            change.before.to_string(),
            change.after.to_string(),
            change.result,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_module_action(conn: &Connection, action: &ModuleAction) -> StoreResult<()> {
    conn.execute(
        r#"
        INSERT INTO module_actions (occurred_at, actor, module_key, action, before_json, after_json, result)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            format_ts(action.timestamp),
            action.actor,
            action.module_key,
            action.action.as_str(),
            action.before.to_string(),
            action.after.to_string(),
            action.result,
        ],
    )?;
    Ok(())
}

fn corrupt(table: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        table,
        message: message.into(),
    }
}

fn json_column(table: &'static str, raw: &str) -> StoreResult<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| corrupt(table, e.to_string()))
}

/// Handle for the audit tables.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    store: Store,
}

impl AuditTrail {
    pub(super) fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn record_validation(&self, attempt: &ValidationAttempt) -> StoreResult<()> {
        self.store.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO validation_attempts (occurred_at, origin, outcome, http_status, message)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    format_ts(attempt.timestamp),
                    attempt.origin.as_str(),
                    attempt.outcome,
                    attempt.http_status,
                    attempt.message,
                ],
            )?;
            Ok(())
        })
    }

    pub fn record_config_change(&self, change: &ConfigChange) -> StoreResult<()> {
        self.store
            .with_conn(|conn| insert_config_change(conn, change))
    }

    /// Newest first.
    pub fn recent_validations(&self, limit: usize) -> StoreResult<Vec<ValidationAttempt>> {
        const TABLE: &str = "validation_attempts";
        let rows: Vec<(String, String, String, Option<u16>, Option<String>)> =
            self.store.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT occurred_at, origin, outcome, http_status, message
                     FROM validation_attempts ORDER BY id DESC LIMIT ?",
                )?;
                let rows = stmt
                    .query_map([limit as i64], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })?;

        rows.into_iter()
            .map(|(ts, origin, outcome, http_status, message)| {
                Ok(ValidationAttempt {
                    timestamp: parse_ts(TABLE, &ts)?,
                    origin: Origin::parse(&origin)
                        .ok_or_else(|| corrupt(TABLE, format!("unknown origin '{}'", origin)))?,
                    outcome,
                    http_status,
                    message,
                })
            })
            .collect()
    }

    /// Newest first.
    pub fn recent_config_changes(&self, limit: usize) -> StoreResult<Vec<ConfigChange>> {
        const TABLE: &str = "config_changes";
        let rows: Vec<(String, String, String, String, String, String)> =
            self.store.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT occurred_at, actor, section, before_json, after_json, result
                     FROM config_changes ORDER BY id DESC LIMIT ?",
                )?;
                let rows = stmt
                    .query_map([limit as i64], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })?;

        rows.into_iter()
            .map(|(ts, actor, section, before, after, result)| {
                Ok(ConfigChange {
                    timestamp: parse_ts(TABLE, &ts)?,
                    actor,
                    section,
                    before: json_column(TABLE, &before)?,
                    after: json_column(TABLE, &after)?,
                    result,
                })
            })
            .collect()
    }

    /// Newest first.
    pub fn recent_module_actions(&self, limit: usize) -> StoreResult<Vec<ModuleAction>> {
        const TABLE: &str = "module_actions";
        #[allow(clippy::type_complexity)]
        let rows: Vec<(String, String, String, String, String, String, String)> =
            self.store.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT occurred_at, actor, module_key, action, before_json, after_json, result
                     FROM module_actions ORDER BY id DESC LIMIT ?",
                )?;
                let rows = stmt
                    .query_map([limit as i64], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })?;

        rows.into_iter()
            .map(|(ts, actor, module_key, action, before, after, result)| {
                Ok(ModuleAction {
                    timestamp: parse_ts(TABLE, &ts)?,
                    actor,
                    module_key,
                    action: ModuleActionKind::parse(&action)
                        .ok_or_else(|| corrupt(TABLE, format!("unknown action '{}'", action)))?,
                    before: json_column(TABLE, &before)?,
                    after: json_column(TABLE, &after)?,
                    result,
                })
            })
            .collect()
    }

    /// Number of module actions for a key (for testing).
    pub fn count_module_actions(&self, module_key: &str) -> StoreResult<u32> {
        self.store.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM module_actions WHERE module_key = ?",
                [module_key],
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
    }
}
