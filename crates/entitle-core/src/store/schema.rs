//! SQLite schema for licensing state.
//!
//! Tables:
//! - `credentials`: single row, authority URL + identifier + secret
//! - `license_cache`: one JSON record per environment
//! - `module_catalog`: authority-published module metadata
//! - `module_state`: local install/enable state
//! - `validation_attempts`, `config_changes`, `module_actions`: append-only audit
//! - `settings`: small key/value table

/// DDL for all licensing tables.
///
/// Schema version: 1
pub const LICENSING_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id                INTEGER PRIMARY KEY CHECK (id = 1),
    base_url          TEXT NOT NULL DEFAULT '',
    client_identifier TEXT NOT NULL,
    client_secret     TEXT,
    updated_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS license_cache (
    client_identifier TEXT PRIMARY KEY,
    record            TEXT NOT NULL,
    validated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS module_catalog (
    module_key        TEXT PRIMARY KEY,
    name              TEXT,
    billing_tier      TEXT NOT NULL,
    catalog_enabled   INTEGER NOT NULL DEFAULT 1,
    available_version TEXT,
    updated_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS module_state (
    module_key        TEXT PRIMARY KEY,
    billing_tier      TEXT NOT NULL,
    is_installed      INTEGER NOT NULL DEFAULT 0,
    is_enabled        INTEGER NOT NULL DEFAULT 0,
    installed_version TEXT,
    updated_at        TEXT NOT NULL
);

-- Audit (append-only)
CREATE TABLE IF NOT EXISTS validation_attempts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    occurred_at TEXT NOT NULL,
    origin      TEXT NOT NULL,
    outcome     TEXT NOT NULL,
    http_status INTEGER,
    message     TEXT
);

CREATE TABLE IF NOT EXISTS config_changes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    occurred_at TEXT NOT NULL,
    actor       TEXT NOT NULL,
    section     TEXT NOT NULL,
    before_json TEXT NOT NULL,
    after_json  TEXT NOT NULL,
    result      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS module_actions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    occurred_at TEXT NOT NULL,
    actor       TEXT NOT NULL,
    module_key  TEXT NOT NULL,
    action      TEXT NOT NULL,
    before_json TEXT NOT NULL,
    after_json  TEXT NOT NULL,
    result      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_module_actions_module_key
    ON module_actions(module_key);
"#;
