//! Credential row: authority URL, stable client identifier, shared secret.

use chrono::Utc;
use entitle_client::Credential;
use rusqlite::{params, Connection};
use tracing::debug;

use super::{format_ts, Store};
use crate::error::StoreResult;

/// Insert the single credential row with a fresh UUID v4 identifier.
/// No-op once the row exists; the identifier is never regenerated.
pub(super) fn ensure_identity(conn: &Connection) -> StoreResult<()> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO credentials (id, client_identifier, updated_at) VALUES (1, ?1, ?2)",
        params![uuid::Uuid::new_v4().to_string(), format_ts(Utc::now())],
    )?;
    if inserted > 0 {
        debug!("generated client identifier");
    }
    Ok(())
}

pub(crate) fn load_credential(conn: &Connection) -> StoreResult<Credential> {
    let (base_url, client_identifier, client_secret): (String, String, Option<String>) = conn
        .query_row(
            "SELECT base_url, client_identifier, client_secret FROM credentials WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
    Ok(Credential::new(
        base_url,
        client_identifier,
        client_secret.filter(|s| !s.is_empty()),
    ))
}

/// Set the base URL. A different URL drops the secret, which is bound to
/// the authority that issued it. Returns the credential before the change.
pub(crate) fn update_base_url(conn: &Connection, base_url: &str) -> StoreResult<Credential> {
    let before = load_credential(conn)?;
    if before.base_url != base_url {
        conn.execute(
            "UPDATE credentials SET base_url = ?1, client_secret = NULL, updated_at = ?2 WHERE id = 1",
            params![base_url, format_ts(Utc::now())],
        )?;
    }
    Ok(before)
}

/// Handle for the credential row.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    store: Store,
}

impl CredentialStore {
    pub(super) fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn load(&self) -> StoreResult<Credential> {
        self.store.with_conn(load_credential)
    }

    pub fn client_identifier(&self) -> StoreResult<String> {
        Ok(self.load()?.client_identifier)
    }

    /// Replace the secret in a single UPDATE.
    pub fn set_secret(&self, secret: &str) -> StoreResult<()> {
        self.store.with_conn(|conn| {
            conn.execute(
                "UPDATE credentials SET client_secret = ?1, updated_at = ?2 WHERE id = 1",
                params![secret, format_ts(Utc::now())],
            )?;
            Ok(())
        })
    }

    /// Set the base URL only when none is stored yet. Returns true if set.
    pub fn seed_base_url(&self, base_url: &str) -> StoreResult<bool> {
        self.store.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE credentials SET base_url = ?1, updated_at = ?2 WHERE id = 1 AND base_url = ''",
                params![base_url, format_ts(Utc::now())],
            )?;
            Ok(changed > 0)
        })
    }

    /// Set the base URL; see [`update_base_url`].
    pub fn set_base_url(&self, base_url: &str) -> StoreResult<Credential> {
        self.store.with_conn(|conn| update_base_url(conn, base_url))
    }
}
