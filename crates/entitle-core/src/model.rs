//! Domain records: cached license state, validation results, module
//! entitlements and audit rows.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use entitle_client::{
    AllowedModules, BillingTier, ClientError, ContractState, LicenseRow, LicenseStatus, Plan,
    ValidateResponse,
};
use serde::{Deserialize, Serialize};

/// Last known entitlement state for one environment.
///
/// Written only as a whole, never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseCacheRecord {
    /// `response.valid && contract_active != Inactive` at write time.
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub plan: Plan,
    #[serde(default)]
    pub contract_active: ContractState,
    #[serde(default)]
    pub license_status: LicenseStatus,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub allowed_modules: AllowedModules,
    #[serde(default)]
    pub licenses_snapshot: Vec<LicenseRow>,
    pub validated_at: DateTime<Utc>,
    #[serde(default)]
    pub http_status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

impl LicenseCacheRecord {
    /// Record for a well-formed authority answer.
    pub fn from_response(response: &ValidateResponse, now: DateTime<Utc>) -> Self {
        Self {
            valid: response.valid && response.contract_active != ContractState::Inactive,
            plan: response.plan,
            contract_active: response.contract_active,
            license_status: response.license_status.clone(),
            expires_at: response.expires_at,
            warnings: response.warnings.clone(),
            allowed_modules: response.allowed_modules.clone(),
            licenses_snapshot: response.licenses.clone(),
            validated_at: now,
            http_status: Some(200),
            message: response.message.clone(),
        }
    }

    /// Fail-closed record: FREE plan, contract unknown, no modules.
    pub fn fail_closed(
        license_status: LicenseStatus,
        message: Option<String>,
        http_status: Option<u16>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            valid: false,
            plan: Plan::Free,
            contract_active: ContractState::Unknown,
            license_status,
            expires_at: None,
            warnings: message.iter().cloned().collect(),
            allowed_modules: AllowedModules::default(),
            licenses_snapshot: Vec::new(),
            validated_at: now,
            http_status,
            message,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.validated_at)
    }

    /// Younger than `window` (a record from the future counts as fresh).
    pub fn is_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < window
    }

    /// Plan used for enforcement: anything not ACTIVE enforces as FREE.
    /// UNKNOWN stays UNKNOWN so it can never pass as FREE.
    pub fn effective_plan(&self) -> Plan {
        match self.plan {
            Plan::Unknown => Plan::Unknown,
            _ if !self.license_status.is_active() => Plan::Free,
            plan => plan,
        }
    }
}

/// Who asked for a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Admin,
    Scheduled,
    Cli,
    System,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Scheduled => "scheduled",
            Self::Cli => "cli",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "scheduled" => Some(Self::Scheduled),
            "cli" => Some(Self::Cli),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context forwarded with a validation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationContext {
    pub origin: Origin,
    #[serde(default)]
    pub requested_modules: Vec<String>,
    /// Opaque extra data for the authority.
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl ValidationContext {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }

    /// The `context` object of the `/validate` body.
    pub(crate) fn wire_context(&self) -> serde_json::Value {
        let mut context = serde_json::json!({ "origin": self.origin.as_str() });
        if !self.extra.is_null() {
            context["extra"] = self.extra.clone();
        }
        context
    }
}

/// Failure class of a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotConfigured,
    Unauthorized,
    RateLimited,
    Network,
    LicenseInvalid,
    InvalidResponse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::Network => "network",
            Self::LicenseInvalid => "license_invalid",
            Self::InvalidResponse => "invalid_response",
        }
    }
}

impl From<&ClientError> for ErrorKind {
    fn from(e: &ClientError) -> Self {
        match e {
            ClientError::NotConfigured { .. } => Self::NotConfigured,
            ClientError::Unauthorized { .. } => Self::Unauthorized,
            ClientError::RateLimited { .. } => Self::RateLimited,
            ClientError::Network { .. } => Self::Network,
            ClientError::AuthorityRejected { .. } => Self::LicenseInvalid,
            ClientError::InvalidResponse { .. } => Self::InvalidResponse,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a [`LicenseResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Fresh cache record, no remote call.
    Cache,
    /// Answer from the authority in this call.
    Remote,
    /// Authority unavailable; last trusted record within the staleness ceiling.
    StaleCache,
    /// Nothing trustworthy; fail-closed defaults.
    Fallback,
}

/// Outcome of `ValidateLicense`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseResult {
    pub valid: bool,
    pub plan: Plan,
    pub contract_active: ContractState,
    pub license_status: LicenseStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub warnings: Vec<String>,
    pub allowed_modules: AllowedModules,
    pub licenses: Vec<LicenseRow>,
    pub http_status: Option<u16>,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub source: ResultSource,
    pub checked_at: DateTime<Utc>,
}

impl LicenseResult {
    pub fn from_record(
        record: &LicenseCacheRecord,
        source: ResultSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            valid: record.valid,
            plan: record.plan,
            contract_active: record.contract_active,
            license_status: record.license_status.clone(),
            expires_at: record.expires_at,
            warnings: record.warnings.clone(),
            allowed_modules: record.allowed_modules.clone(),
            licenses: record.licenses_snapshot.clone(),
            http_status: record.http_status,
            message: record.message.clone(),
            error_kind: None,
            source,
            checked_at: now,
        }
    }

    /// Fail-closed result that was not persisted.
    pub fn fallback(now: DateTime<Utc>) -> Self {
        Self::from_record(
            &LicenseCacheRecord::fail_closed(LicenseStatus::Unknown, None, None, now),
            ResultSource::Fallback,
            now,
        )
    }

    pub(crate) fn with_error(
        mut self,
        kind: ErrorKind,
        http_status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        self.error_kind = Some(kind);
        self.http_status = http_status;
        self.message = Some(message.into());
        self
    }
}

/// Effective entitlement of one module, derived on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntitlement {
    pub key: String,
    pub name: Option<String>,
    pub billing_tier: BillingTier,
    pub catalog_enabled: bool,
    pub is_installed: bool,
    pub is_enabled: bool,
    pub installed_version: Option<String>,
    pub available_version: Option<String>,
    pub usable: bool,
}

/// One validation attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationAttempt {
    pub timestamp: DateTime<Utc>,
    pub origin: Origin,
    /// `valid`, `invalid` or an error kind.
    pub outcome: String,
    pub http_status: Option<u16>,
    pub message: Option<String>,
}

/// One configuration change. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub section: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub result: String,
}

/// Module lifecycle verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleActionKind {
    Install,
    Enable,
    Disable,
}

impl ModuleActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "install" => Some(Self::Install),
            "enable" => Some(Self::Enable),
            "disable" => Some(Self::Disable),
            _ => None,
        }
    }
}

/// One module state transition. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleAction {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub module_key: String,
    pub action: ModuleActionKind,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub result: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: serde_json::Value) -> ValidateResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_inactive_contract_is_never_valid() {
        let now = Utc::now();
        let record = LicenseCacheRecord::from_response(
            &response(serde_json::json!({
                "valid": true,
                "plan": "ENTERPRISE",
                "contract_active": false,
                "license_status": "ACTIVE"
            })),
            now,
        );
        assert!(!record.valid);
        assert_eq!(record.contract_active, ContractState::Inactive);
    }

    #[test]
    fn test_effective_plan() {
        let now = Utc::now();
        let mut record = LicenseCacheRecord::from_response(
            &response(serde_json::json!({"valid": true, "plan": "PRO", "license_status": "EXPIRED"})),
            now,
        );
        assert_eq!(record.effective_plan(), Plan::Free);

        record.license_status = LicenseStatus::Active;
        assert_eq!(record.effective_plan(), Plan::Pro);

        record.plan = Plan::Unknown;
        assert_eq!(record.effective_plan(), Plan::Unknown);
    }

    #[test]
    fn test_record_survives_storage_format() {
        let now = Utc::now();
        let record = LicenseCacheRecord::from_response(
            &response(serde_json::json!({
                "valid": true,
                "plan": "STARTER",
                "license_status": "ACTIVE",
                "allowed_modules": "*"
            })),
            now,
        );
        let stored = serde_json::to_string(&record).unwrap();
        let loaded: LicenseCacheRecord = serde_json::from_str(&stored).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.contract_active, ContractState::Unknown);
    }

    #[test]
    fn test_freshness_window() {
        let now = Utc::now();
        let mut record =
            LicenseCacheRecord::fail_closed(LicenseStatus::Unknown, None, None, now);
        assert!(record.is_within(Duration::hours(12), now));
        record.validated_at = now - Duration::hours(13);
        assert!(!record.is_within(Duration::hours(12), now));
        assert!(record.is_within(Duration::hours(72), now));
    }

    #[test]
    fn test_wire_context_carries_origin() {
        let context = ValidationContext::new(Origin::Scheduled)
            .with_extra(serde_json::json!({"host": "web-1"}));
        assert_eq!(
            context.wire_context(),
            serde_json::json!({"origin": "scheduled", "extra": {"host": "web-1"}})
        );
        assert_eq!(
            ValidationContext::default().wire_context(),
            serde_json::json!({"origin": "admin"})
        );
    }
}
