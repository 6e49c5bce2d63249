//! License cache: one JSON record per environment, replaced as a unit.

use rusqlite::{params, Connection, OptionalExtension};

use super::{format_ts, Store};
use crate::error::{StoreError, StoreResult};
use crate::model::LicenseCacheRecord;

pub(crate) fn load_record(
    conn: &Connection,
    client_identifier: &str,
) -> StoreResult<Option<LicenseCacheRecord>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT record FROM license_cache WHERE client_identifier = ?",
            [client_identifier],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|json| {
        serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
            table: "license_cache",
            message: e.to_string(),
        })
    })
    .transpose()
}

#[derive(Debug, Clone)]
pub struct LicenseCache {
    store: Store,
}

impl LicenseCache {
    pub(super) fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn load(&self, client_identifier: &str) -> StoreResult<Option<LicenseCacheRecord>> {
        self.store
            .with_conn(|conn| load_record(conn, client_identifier))
    }

    /// Single-row replace.
    pub fn replace(&self, client_identifier: &str, record: &LicenseCacheRecord) -> StoreResult<()> {
        let json = serde_json::to_string(record)?;
        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO license_cache (client_identifier, record, validated_at) VALUES (?1, ?2, ?3)",
                params![client_identifier, json, format_ts(record.validated_at)],
            )?;
            Ok(())
        })
    }
}
