//! Entitlement engine: per-module usability and the transitions that
//! follow from it.
//!
//! Usability is derived on every read from the cached license record and
//! the merged module rows. Nothing here is cached.
//!
//! Decision order (first match wins):
//! 1. withdrawn from the catalog: unusable
//! 2. free tier: usable
//! 3. plan UNKNOWN (never validated): unusable
//! 4. contract inactive: unusable
//! 5. license not ACTIVE or FREE plan: unusable
//! 6. allow-list: wildcard or member is usable; an empty list with a
//!    validated paid plan is usable until the authority restricts it

use chrono::Utc;
use entitle_client::{AllowedModules, BillingTier, ContractState, Plan};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult, StoreResult};
use crate::model::{LicenseCacheRecord, ModuleAction, ModuleActionKind, ModuleEntitlement};
use crate::store::{
    insert_module_action, load_credential, load_record, load_row, upsert_state, ModuleRow,
    StateRow, Store,
};

const MAX_MODULE_KEY_LEN: usize = 64;

/// `[a-z0-9_-]{1,64}`
pub fn is_valid_module_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_MODULE_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// Table name prefix owned by a module.
pub fn module_table_prefix(key: &str) -> String {
    format!("module_{}_", key.replace('-', "_"))
}

/// Why a module is unusable, or `None` when it is usable.
pub fn denial_reason(
    key: &str,
    billing_tier: BillingTier,
    catalog_enabled: bool,
    license: Option<&LicenseCacheRecord>,
) -> Option<&'static str> {
    if !catalog_enabled {
        return Some("withdrawn from the catalog");
    }
    if !billing_tier.is_paid() {
        return None;
    }

    let Some(license) = license.filter(|l| l.plan != Plan::Unknown) else {
        return Some("no license has been validated");
    };
    if license.contract_active == ContractState::Inactive {
        return Some("contract is inactive");
    }
    if !license.valid {
        return Some("license is not valid");
    }
    if license.effective_plan() == Plan::Free {
        return Some("license does not cover paid modules");
    }

    match &license.allowed_modules {
        AllowedModules::All => None,
        AllowedModules::List(set) if set.is_empty() => None,
        AllowedModules::List(set) if set.contains(key) => None,
        AllowedModules::List(_) => Some("not included in the license"),
    }
}

pub fn module_usable(
    key: &str,
    billing_tier: BillingTier,
    catalog_enabled: bool,
    license: Option<&LicenseCacheRecord>,
) -> bool {
    denial_reason(key, billing_tier, catalog_enabled, license).is_none()
}

fn row_denial(row: &ModuleRow, license: Option<&LicenseCacheRecord>) -> Option<&'static str> {
    denial_reason(&row.key, row.billing_tier(), row.catalog_enabled(), license)
}

fn entitlement(row: &ModuleRow, license: Option<&LicenseCacheRecord>) -> ModuleEntitlement {
    ModuleEntitlement {
        key: row.key.clone(),
        name: row.name(),
        billing_tier: row.billing_tier(),
        catalog_enabled: row.catalog_enabled(),
        is_installed: row.is_installed(),
        is_enabled: row.is_enabled(),
        installed_version: row.installed_version(),
        available_version: row.available_version(),
        usable: row_denial(row, license).is_none(),
    }
}

fn state_json(state: &StateRow) -> serde_json::Value {
    serde_json::json!({
        "installed": state.is_installed,
        "enabled": state.is_enabled,
        "version": state.installed_version,
    })
}

fn license_in(conn: &Connection) -> StoreResult<Option<LicenseCacheRecord>> {
    let credential = load_credential(conn)?;
    load_record(conn, &credential.client_identifier)
}

/// Write the new state and its audit row. Caller holds the transaction.
fn apply(
    conn: &Connection,
    actor: &str,
    action: ModuleActionKind,
    before: &StateRow,
    after: StateRow,
    result: &str,
) -> StoreResult<ModuleAction> {
    upsert_state(conn, &after)?;
    let record = ModuleAction {
        timestamp: Utc::now(),
        actor: actor.to_string(),
        module_key: after.key.clone(),
        action,
        before: state_json(before),
        after: state_json(&after),
        result: result.to_string(),
    };
    insert_module_action(conn, &record)?;
    Ok(record)
}

/// Module usability and lifecycle transitions.
#[derive(Debug, Clone)]
pub struct EntitlementEngine {
    store: Store,
}

impl EntitlementEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn license(&self) -> StoreResult<Option<LicenseCacheRecord>> {
        self.store.with_conn(license_in)
    }

    /// Unknown or malformed keys are unusable.
    pub fn is_module_usable(&self, key: &str) -> StoreResult<bool> {
        if !is_valid_module_key(key) {
            return Ok(false);
        }
        let Some(row) = self.store.modules().get(key)? else {
            return Ok(false);
        };
        Ok(row_denial(&row, self.license()?.as_ref()).is_none())
    }

    /// Merged modules, excluding catalog-withdrawn ones, sorted by key.
    pub fn list_modules(&self) -> StoreResult<Vec<ModuleEntitlement>> {
        let license = self.license()?;
        Ok(self
            .store
            .modules()
            .rows()?
            .iter()
            .filter(|row| row.catalog_enabled())
            .map(|row| entitlement(row, license.as_ref()))
            .collect())
    }

    /// Tables in the host database owned by `key`.
    pub fn data_tables(&self, key: &str) -> StoreResult<Vec<String>> {
        self.store.modules().table_names(&module_table_prefix(key))
    }

    /// Degrade path after a failed or invalid validation: disable every
    /// enabled paid module. Data and install state are kept.
    pub fn enforce_free_tier_for_paid_modules(&self, actor: &str) -> StoreResult<Vec<ModuleAction>> {
        let actions = self.disable_where(actor, "free_tier_fallback", |row, _| {
            row.billing_tier().is_paid()
        })?;
        if !actions.is_empty() {
            info!(disabled = actions.len(), "paid modules disabled (free tier fallback)");
        }
        Ok(actions)
    }

    /// Disable every enabled module that is no longer usable.
    pub fn reconcile(&self, actor: &str) -> StoreResult<Vec<ModuleAction>> {
        let actions = self.disable_where(actor, "reconcile", |row, license| {
            row_denial(row, license).is_some()
        })?;
        if !actions.is_empty() {
            info!(disabled = actions.len(), "modules disabled after reconciliation");
        }
        Ok(actions)
    }

    /// Each candidate is re-checked inside its own transaction, so a
    /// concurrent pass cannot produce a second transition.
    fn disable_where(
        &self,
        actor: &str,
        reason: &str,
        should_disable: impl Fn(&ModuleRow, Option<&LicenseCacheRecord>) -> bool,
    ) -> StoreResult<Vec<ModuleAction>> {
        let candidates: Vec<String> = self
            .store
            .modules()
            .rows()?
            .into_iter()
            .filter(ModuleRow::is_enabled)
            .map(|row| row.key)
            .collect();

        let mut actions = Vec::new();
        for key in candidates {
            let action = self.store.transaction(|conn| {
                let Some(row) = load_row(conn, &key)? else {
                    return Ok(None);
                };
                if !row.is_enabled() || !should_disable(&row, license_in(conn)?.as_ref()) {
                    return Ok(None);
                }
                let before = row.state_or_default();
                let after = StateRow {
                    is_enabled: false,
                    ..before.clone()
                };
                apply(conn, actor, ModuleActionKind::Disable, &before, after, reason).map(Some)
            })?;
            if let Some(action) = action {
                debug!(module = %action.module_key, reason, "module disabled");
                actions.push(action);
            }
        }
        Ok(actions)
    }

    /// Install a usable module (installed, not enabled). No-op if installed.
    pub fn install_module(&self, key: &str, actor: &str) -> ServiceResult<Option<ModuleAction>> {
        self.store.transaction(|conn| {
            let row = require_row(conn, key)?;
            if row.is_installed() {
                return Ok(None);
            }
            if let Some(reason) = row_denial(&row, license_in(conn)?.as_ref()) {
                return Err(not_entitled(key, reason));
            }
            let before = row.state_or_default();
            let after = StateRow {
                billing_tier: row.billing_tier(),
                is_installed: true,
                is_enabled: false,
                installed_version: row.available_version(),
                ..before.clone()
            };
            Ok(Some(apply(conn, actor, ModuleActionKind::Install, &before, after, "ok")?))
        })
    }

    /// Enable an installed, usable module. No-op if enabled.
    pub fn enable_module(&self, key: &str, actor: &str) -> ServiceResult<Option<ModuleAction>> {
        self.store.transaction(|conn| {
            let row = require_row(conn, key)?;
            if !row.is_installed() {
                return Err(ServiceError::validation(
                    "module",
                    format!("'{}' is not installed", key),
                ));
            }
            if row.is_enabled() {
                return Ok(None);
            }
            if let Some(reason) = row_denial(&row, license_in(conn)?.as_ref()) {
                return Err(not_entitled(key, reason));
            }
            let before = row.state_or_default();
            let after = StateRow {
                is_enabled: true,
                ..before.clone()
            };
            Ok(Some(apply(conn, actor, ModuleActionKind::Enable, &before, after, "ok")?))
        })
    }

    /// Disable a module. Always allowed; no-op if already disabled.
    pub fn disable_module(&self, key: &str, actor: &str) -> ServiceResult<Option<ModuleAction>> {
        self.store.transaction(|conn| {
            let row = require_row(conn, key)?;
            if !row.is_enabled() {
                return Ok(None);
            }
            let before = row.state_or_default();
            let after = StateRow {
                is_enabled: false,
                ..before.clone()
            };
            Ok(Some(apply(conn, actor, ModuleActionKind::Disable, &before, after, "ok")?))
        })
    }
}

fn require_row(conn: &Connection, key: &str) -> ServiceResult<ModuleRow> {
    load_row(conn, key)?.ok_or_else(|| ServiceError::ModuleNotFound {
        key: key.to_string(),
    })
}

fn not_entitled(key: &str, reason: &str) -> ServiceError {
    ServiceError::NotEntitled {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
