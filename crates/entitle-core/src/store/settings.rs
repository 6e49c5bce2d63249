//! Key/value settings.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_ts, parse_ts, Store};
use crate::error::StoreResult;

/// Deadline before which no contact lead may be submitted.
pub const LEAD_COOLDOWN_KEY: &str = "lead_cooldown_until";

/// Deadline set by a rate-limited `/validate`; no remote call before it.
pub const VALIDATE_COOLDOWN_KEY: &str = "validate_cooldown_until";

#[derive(Debug, Clone)]
pub struct Settings {
    store: Store,
}

impl Settings {
    pub(super) fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.store.with_conn(|conn| get_value(conn, key))
    }

    pub fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.store.with_conn(|conn| set_value(conn, key, value))
    }

    pub fn remove(&self, key: &str) -> StoreResult<()> {
        self.store.with_conn(|conn| {
            conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
            Ok(())
        })
    }

    pub fn get_timestamp(&self, key: &str) -> StoreResult<Option<DateTime<Utc>>> {
        self.get(key)?
            .map(|raw| parse_ts("settings", &raw))
            .transpose()
    }

    pub fn set_timestamp(&self, key: &str, ts: DateTime<Utc>) -> StoreResult<()> {
        self.set(key, &format_ts(ts))
    }

    /// Set the deadline under `key` to `until` unless one later than `now`
    /// is already pending. Returns the pending deadline on refusal.
    pub fn claim_deadline(
        &self,
        key: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        self.store.transaction(|conn| {
            let pending = get_value(conn, key)?
                .map(|raw| parse_ts("settings", &raw))
                .transpose()?
                .filter(|deadline| *deadline > now);
            if pending.is_none() {
                set_value(conn, key, &format_ts(until))?;
            }
            Ok(pending)
        })
    }
}

fn get_value(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
            row.get(0)
        })
        .optional()?)
}

fn set_value(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}
