//! Wire types for the licensing authority protocol.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wildcard value of `allowed_modules` meaning "all modules".
pub const ALL_MODULES: &str = "*";

/// License plan (tier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Plan {
    /// Never validated, or a plan name we do not recognise.
    #[default]
    Unknown,
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Plan {
    /// Parse a plan name. `BUSINESS` is the legacy name of `PRO`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Self::Free,
            "STARTER" => Self::Starter,
            "PRO" | "BUSINESS" => Self::Pro,
            "ENTERPRISE" => Self::Enterprise,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Free => "FREE",
            Self::Starter => "STARTER",
            Self::Pro => "PRO",
            Self::Enterprise => "ENTERPRISE",
        }
    }

    /// Whether this is a validated paid tier.
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Starter | Self::Pro | Self::Enterprise)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Plan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Plan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| Self::parse(&s)).unwrap_or_default())
    }
}

/// Contract state. "Never validated" is its own value and is never
/// collapsed into `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContractState {
    #[default]
    Unknown,
    Active,
    Inactive,
}

impl ContractState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    fn from_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(true) => Self::Active,
            serde_json::Value::Bool(false) => Self::Inactive,
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(1) => Self::Active,
                Some(0) => Self::Inactive,
                _ => Self::Unknown,
            },
            serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "active" | "1" => Self::Active,
                "false" | "inactive" | "0" => Self::Inactive,
                _ => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ContractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ContractState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unknown => serializer.serialize_none(),
            Self::Active => serializer.serialize_bool(true),
            Self::Inactive => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for ContractState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// License status reported by the authority.
///
/// Codes outside the recognised set are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum LicenseStatus {
    #[default]
    Unknown,
    Active,
    Expired,
    FreeTier,
    Suspended,
    Other(String),
}

impl LicenseStatus {
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "" | "UNKNOWN" => Self::Unknown,
            "ACTIVE" => Self::Active,
            "EXPIRED" => Self::Expired,
            "FREE_TIER" => Self::FreeTier,
            "SUSPENDED" => Self::Suspended,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::FreeTier => "FREE_TIER",
            Self::Suspended => "SUSPENDED",
            Self::Other(code) => code,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LicenseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LicenseStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| Self::parse(&s)).unwrap_or_default())
    }
}

/// Modules a license grants: the "all modules" wildcard or an explicit set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedModules {
    All,
    List(BTreeSet<String>),
}

impl Default for AllowedModules {
    fn default() -> Self {
        Self::List(BTreeSet::new())
    }
}

impl AllowedModules {
    /// Build from a list of keys; a `*` entry anywhere wins.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for key in keys {
            let key = key.into();
            if key.trim() == ALL_MODULES {
                return Self::All;
            }
            set.insert(key.trim().to_string());
        }
        Self::List(set)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// True for an explicit, empty list (no restriction returned yet).
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::List(set) if set.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::List(set) => set.contains(key),
        }
    }
}

impl Serialize for AllowedModules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str(ALL_MODULES),
            Self::List(set) => set.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AllowedModules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<Wire>::deserialize(deserializer)? {
            None => Self::default(),
            Some(Wire::One(s)) if s.trim() == ALL_MODULES => Self::All,
            Some(Wire::One(s)) => Self::from_keys([s]),
            Some(Wire::Many(keys)) => Self::from_keys(keys),
        })
    }
}

/// Billing tier of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BillingTier {
    Free,
    #[default]
    Paid,
}

impl BillingTier {
    /// Anything other than `free` is billed.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("free") {
            Self::Free
        } else {
            Self::Paid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }
}

impl fmt::Display for BillingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BillingTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BillingTier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| Self::parse(&s)).unwrap_or_default())
    }
}

/// One license row; an environment may hold several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRow {
    /// License key as reported by the authority.
    pub key: String,

    #[serde(default)]
    pub plan: Plan,

    #[serde(default)]
    pub contract_active: ContractState,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub allowed_modules: AllowedModules,
}

/// Catalog entry published by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogModule {
    pub key: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub billing_tier: BillingTier,

    /// False when the module was withdrawn from distribution.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Latest available version.
    #[serde(default)]
    pub version: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Body of `POST /validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub client_id: String,

    #[serde(default)]
    pub requested_modules: Vec<String>,

    /// Opaque caller context.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
}

/// Response from `POST /validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateResponse {
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
    pub licenses: Vec<LicenseRow>,

    #[serde(default)]
    pub message: Option<String>,

    /// Catalog snapshot; absent when the authority does not publish one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<CatalogModule>>,
}

/// Body of `POST /bootstrap-secret`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRequest {
    pub client_id: String,
}

/// Response from `POST /bootstrap-secret`.
#[derive(Clone, Serialize, Deserialize)]
pub struct BootstrapResponse {
    pub secret: String,

    /// True when the authority returned an already provisioned secret.
    #[serde(default)]
    pub reused: bool,
}

impl fmt::Debug for BootstrapResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapResponse")
            .field("secret", &"<redacted>")
            .field("reused", &self.reused)
            .finish()
    }
}

/// Contact lead submitted to `POST /leads`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadPayload {
    pub name: String,
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    pub message: String,

    /// Modules the lead is interested in.
    #[serde(default)]
    pub modules: Vec<String>,
}

/// Response from `POST /leads`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadReceipt {
    pub ticket_id: String,
}

/// Distribution client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures of `validate`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    2
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `ENTITLE_TIMEOUT` | Request timeout in seconds |
    /// | `ENTITLE_MAX_RETRIES` | Max retries for transient failures |
    pub fn from_env() -> Self {
        Self {
            timeout_secs: std::env::var("ENTITLE_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            max_retries: std::env::var("ENTITLE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_retries),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the retry budget for transient failures.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}
