//! Store: SQLite-backed licensing state.
//!
//! One shared connection behind `Arc<Mutex<_>>`. Sub-stores are cheap
//! handles over the same connection:
//! - [`CredentialStore`]: authority URL, client identifier, secret
//! - [`LicenseCache`]: last known entitlement record
//! - [`ModuleRegistry`]: catalog + local module state
//! - [`AuditTrail`]: append-only audit streams
//! - [`Settings`]: key/value flags (lead cooldown)
//!
//! The lock is never held across an `.await`.

mod audit;
mod cache;
mod credentials;
mod modules;
mod schema;
mod settings;

pub use audit::AuditTrail;
pub use cache::LicenseCache;
pub use credentials::CredentialStore;
pub use modules::{CatalogRow, ModuleRegistry, ModuleRow, StateRow};
pub use schema::LICENSING_SCHEMA;
pub use settings::{Settings, LEAD_COOLDOWN_KEY, VALIDATE_COOLDOWN_KEY};

pub(crate) use audit::{insert_config_change, insert_module_action};
pub(crate) use cache::load_record;
pub(crate) use credentials::{load_credential, update_base_url};
pub(crate) use modules::{load_row, upsert_state};

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

/// SQLite-backed licensing store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open a file-backed store, creating parent directories.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.display().to_string(),
                message: e.to_string(),
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> StoreResult<()> {
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL");
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;
        conn.execute_batch(LICENSING_SCHEMA)?;
        credentials::ensure_identity(conn)?;
        Ok(())
    }

    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::new(self.clone())
    }

    pub fn license_cache(&self) -> LicenseCache {
        LicenseCache::new(self.clone())
    }

    pub fn modules(&self) -> ModuleRegistry {
        ModuleRegistry::new(self.clone())
    }

    pub fn audit(&self) -> AuditTrail {
        AuditTrail::new(self.clone())
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.clone())
    }

    /// Run `f` with the connection locked.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Run `f` inside `BEGIN IMMEDIATE` / `COMMIT`; rolls back on error.
    pub(crate) fn transaction<T, E>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.conn.lock().unwrap();

        // BEGIN IMMEDIATE acquires write lock immediately
        conn.execute("BEGIN IMMEDIATE", [])
            .map_err(StoreError::from)?;

        let result = f(&conn);

        match &result {
            Ok(_) => {
                conn.execute("COMMIT", []).map_err(StoreError::from)?;
            }
            Err(_) => {
                let _ = conn.execute("ROLLBACK", []);
            }
        }

        result
    }
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(table: &'static str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            message: format!("bad timestamp '{}': {}", raw, e),
        })
}
