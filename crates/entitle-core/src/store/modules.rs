//! Module registry rows: authority catalog and local install state.
//!
//! Both are keyed by module key and merged on read. Catalog metadata wins
//! for tier, name and version; a key present in neither table does not
//! exist.

use std::collections::BTreeMap;

use chrono::Utc;
use entitle_client::{BillingTier, CatalogModule};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{format_ts, Store};
use crate::error::StoreResult;

/// Authority catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub key: String,
    pub name: Option<String>,
    pub billing_tier: BillingTier,
    pub catalog_enabled: bool,
    pub available_version: Option<String>,
}

/// Local install state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRow {
    pub key: String,
    /// Tier recorded at install time; used when the catalog has no entry.
    pub billing_tier: BillingTier,
    pub is_installed: bool,
    pub is_enabled: bool,
    pub installed_version: Option<String>,
}

/// Catalog and local state for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRow {
    pub key: String,
    pub catalog: Option<CatalogRow>,
    pub state: Option<StateRow>,
}

impl ModuleRow {
    pub fn billing_tier(&self) -> BillingTier {
        self.catalog
            .as_ref()
            .map(|c| c.billing_tier)
            .or_else(|| self.state.as_ref().map(|s| s.billing_tier))
            .unwrap_or_default()
    }

    pub fn name(&self) -> Option<String> {
        self.catalog.as_ref().and_then(|c| c.name.clone())
    }

    /// Local-only modules were never withdrawn.
    pub fn catalog_enabled(&self) -> bool {
        self.catalog.as_ref().map_or(true, |c| c.catalog_enabled)
    }

    pub fn is_installed(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_installed)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_enabled)
    }

    pub fn installed_version(&self) -> Option<String> {
        self.state.as_ref().and_then(|s| s.installed_version.clone())
    }

    pub fn available_version(&self) -> Option<String> {
        self.catalog.as_ref().and_then(|c| c.available_version.clone())
    }

    /// State row to write, starting from the current one.
    pub(crate) fn state_or_default(&self) -> StateRow {
        self.state.clone().unwrap_or_else(|| StateRow {
            key: self.key.clone(),
            billing_tier: self.billing_tier(),
            is_installed: false,
            is_enabled: false,
            installed_version: None,
        })
    }
}

fn catalog_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogRow> {
    let tier: String = row.get(2)?;
    Ok(CatalogRow {
        key: row.get(0)?,
        name: row.get(1)?,
        billing_tier: BillingTier::parse(&tier),
        catalog_enabled: row.get::<_, i64>(3)? != 0,
        available_version: row.get(4)?,
    })
}

fn state_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StateRow> {
    let tier: String = row.get(1)?;
    Ok(StateRow {
        key: row.get(0)?,
        billing_tier: BillingTier::parse(&tier),
        is_installed: row.get::<_, i64>(2)? != 0,
        is_enabled: row.get::<_, i64>(3)? != 0,
        installed_version: row.get(4)?,
    })
}

fn empty_row(key: &str) -> ModuleRow {
    ModuleRow {
        key: key.to_string(),
        catalog: None,
        state: None,
    }
}

const CATALOG_COLUMNS: &str =
    "module_key, name, billing_tier, catalog_enabled, available_version";
const STATE_COLUMNS: &str =
    "module_key, billing_tier, is_installed, is_enabled, installed_version";

pub(crate) fn load_row(conn: &Connection, key: &str) -> StoreResult<Option<ModuleRow>> {
    let catalog = conn
        .query_row(
            &format!("SELECT {} FROM module_catalog WHERE module_key = ?", CATALOG_COLUMNS),
            [key],
            catalog_from_row,
        )
        .optional()?;
    let state = conn
        .query_row(
            &format!("SELECT {} FROM module_state WHERE module_key = ?", STATE_COLUMNS),
            [key],
            state_from_row,
        )
        .optional()?;

    if catalog.is_none() && state.is_none() {
        return Ok(None);
    }
    Ok(Some(ModuleRow {
        key: key.to_string(),
        catalog,
        state,
    }))
}

pub(crate) fn upsert_state(conn: &Connection, state: &StateRow) -> StoreResult<()> {
    conn.execute(
        r#"
        INSERT INTO module_state (
            module_key, billing_tier, is_installed, is_enabled, installed_version, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(module_key) DO UPDATE SET
            billing_tier = excluded.billing_tier,
            is_installed = excluded.is_installed,
            is_enabled = excluded.is_enabled,
            installed_version = excluded.installed_version,
            updated_at = excluded.updated_at
        "#,
        params![
            state.key,
            state.billing_tier.as_str(),
            state.is_installed as i32,
            state.is_enabled as i32,
            state.installed_version,
            format_ts(Utc::now()),
        ],
    )?;
    Ok(())
}

fn insert_catalog(conn: &Connection, module: &CatalogModule, verb: &str) -> StoreResult<usize> {
    let changed = conn.execute(
        &format!(
            "{} INTO module_catalog ({}, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            verb, CATALOG_COLUMNS
        ),
        params![
            module.key,
            module.name,
            module.billing_tier.as_str(),
            module.enabled as i32,
            module.version,
            format_ts(Utc::now()),
        ],
    )?;
    Ok(changed)
}

/// Handle for catalog and module state rows.
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    store: Store,
}

impl ModuleRegistry {
    pub(super) fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert static catalog entries without overwriting existing ones.
    /// Returns the number of new rows.
    pub fn seed_catalog(&self, modules: &[CatalogModule]) -> StoreResult<usize> {
        self.store.transaction(|conn| {
            let mut inserted = 0;
            for module in modules {
                inserted += insert_catalog(conn, module, "INSERT OR IGNORE")?;
            }
            Ok(inserted)
        })
    }

    /// Replace the whole catalog with the authority's list.
    pub fn replace_catalog(&self, modules: &[CatalogModule]) -> StoreResult<()> {
        self.store.transaction(|conn| {
            conn.execute("DELETE FROM module_catalog", [])?;
            for module in modules {
                insert_catalog(conn, module, "INSERT OR REPLACE")?;
            }
            debug!(count = modules.len(), "module catalog replaced");
            Ok(())
        })
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<ModuleRow>> {
        self.store.with_conn(|conn| load_row(conn, key))
    }

    /// All known keys, merged, sorted by key.
    pub fn rows(&self) -> StoreResult<Vec<ModuleRow>> {
        self.store.with_conn(|conn| {
            let mut merged: BTreeMap<String, ModuleRow> = BTreeMap::new();

            let mut stmt = conn.prepare(&format!("SELECT {} FROM module_catalog", CATALOG_COLUMNS))?;
            for catalog in stmt.query_map([], catalog_from_row)? {
                let catalog = catalog?;
                let key = catalog.key.clone();
                merged
                    .entry(key)
                    .or_insert_with_key(|key| empty_row(key))
                    .catalog = Some(catalog);
            }

            let mut stmt = conn.prepare(&format!("SELECT {} FROM module_state", STATE_COLUMNS))?;
            for state in stmt.query_map([], state_from_row)? {
                let state = state?;
                let key = state.key.clone();
                merged
                    .entry(key)
                    .or_insert_with_key(|key| empty_row(key))
                    .state = Some(state);
            }

            Ok(merged.into_values().collect())
        })
    }

    /// Names of tables starting with `prefix`, sorted.
    pub fn table_names(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names
                .into_iter()
                .filter(|name| name.starts_with(prefix))
                .collect())
        })
    }
}
