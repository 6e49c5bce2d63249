//! Permission gate: capability checks for caller-facing operations.
//!
//! Checks run before any side effect, so a denied call leaves no trace
//! besides the log line.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read-only validation, module listing, audit access.
    AdminRead,
    /// Configuration, secret rotation, module lifecycle. Implies `AdminRead`.
    AdminWrite,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdminRead => "admin_read",
            Self::AdminWrite => "admin_write",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is calling, and what they may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub actor: String,
    capabilities: BTreeSet<Capability>,
}

impl Caller {
    pub fn new(actor: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            actor: actor.into(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn admin(actor: impl Into<String>) -> Self {
        Self::new(actor, [Capability::AdminRead, Capability::AdminWrite])
    }

    pub fn viewer(actor: impl Into<String>) -> Self {
        Self::new(actor, [Capability::AdminRead])
    }

    /// Built-in caller for scheduled work. Read only.
    pub fn system() -> Self {
        Self::viewer("system")
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::AdminRead => {
                self.capabilities.contains(&Capability::AdminRead)
                    || self.capabilities.contains(&Capability::AdminWrite)
            }
            Capability::AdminWrite => self.capabilities.contains(&Capability::AdminWrite),
        }
    }
}

/// Caller-facing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ValidateLicense,
    ListModules,
    GetModuleDataTables,
    IsModuleUsable,
    ReadAudit,
    SaveConfiguration,
    RegenerateSecret,
    SubmitContactLead,
    InstallModule,
    EnableModule,
    DisableModule,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidateLicense => "validate_license",
            Self::ListModules => "list_modules",
            Self::GetModuleDataTables => "get_module_data_tables",
            Self::IsModuleUsable => "is_module_usable",
            Self::ReadAudit => "read_audit",
            Self::SaveConfiguration => "save_configuration",
            Self::RegenerateSecret => "regenerate_secret",
            Self::SubmitContactLead => "submit_contact_lead",
            Self::InstallModule => "install_module",
            Self::EnableModule => "enable_module",
            Self::DisableModule => "disable_module",
        }
    }

    pub fn required(&self) -> Capability {
        match self {
            Self::ValidateLicense
            | Self::ListModules
            | Self::GetModuleDataTables
            | Self::IsModuleUsable
            | Self::ReadAudit => Capability::AdminRead,
            Self::SaveConfiguration
            | Self::RegenerateSecret
            | Self::SubmitContactLead
            | Self::InstallModule
            | Self::EnableModule
            | Self::DisableModule => Capability::AdminWrite,
        }
    }
}

/// Fail with `PermissionDenied` unless `caller` may run `operation`.
pub fn authorize(caller: &Caller, operation: Operation) -> ServiceResult<()> {
    let required = operation.required();
    if caller.has(required) {
        return Ok(());
    }
    warn!(
        actor = %caller.actor,
        operation = operation.as_str(),
        required = required.as_str(),
        "permission denied"
    );
    Err(ServiceError::PermissionDenied {
        actor: caller.actor.clone(),
        operation: operation.as_str(),
        required: required.as_str(),
    })
}
