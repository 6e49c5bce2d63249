//! Configuration: serde defaults, then an optional YAML file, then the
//! environment.

use std::path::{Path, PathBuf};

use entitle_client::{CatalogModule, ClientConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Upper bound for every configured window (ten years).
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EntitleConfig {
    /// Seeds the credential's base URL when the store has none.
    pub authority_url: Option<String>,

    /// SQLite database file.
    pub database_path: PathBuf,

    /// HTTP client settings.
    pub client: ClientConfig,

    /// Cached results younger than this are served without a remote call.
    pub cache_ttl_secs: u64,

    /// Oldest cached record still trusted when the authority is unavailable.
    pub stale_ceiling_secs: u64,

    /// Minimum interval between contact lead submissions.
    pub lead_cooldown_secs: u64,

    /// Static catalog entries, inserted at startup without overwriting
    /// what the authority published.
    pub catalog: Vec<CatalogModule>,
}

impl Default for EntitleConfig {
    fn default() -> Self {
        Self {
            authority_url: None,
            database_path: default_database_path(),
            client: ClientConfig::default(),
            cache_ttl_secs: 12 * 60 * 60,
            stale_ceiling_secs: 72 * 60 * 60,
            lead_cooldown_secs: 30 * 60,
            catalog: Vec::new(),
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("entitle")
        .join("entitle.db")
}

/// Accept only absolute `http`/`https` URLs; returns the trimmed form.
pub fn validate_base_url(raw: &str) -> ServiceResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| ServiceError::validation("base_url", format!("'{}': {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(trimmed.to_string()),
        scheme => Err(ServiceError::validation(
            "base_url",
            format!("unsupported scheme '{}' (expected http or https)", scheme),
        )),
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl EntitleConfig {
    /// Load from YAML. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> ServiceResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ServiceError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ServiceError::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    /// Defaults (or `path`), then environment overrides, then validation.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `ENTITLE_AUTHORITY_URL` | `authority_url` |
    /// | `ENTITLE_DB` | `database_path` |
    /// | `ENTITLE_TIMEOUT` | `client.timeout_secs` |
    /// | `ENTITLE_MAX_RETRIES` | `client.max_retries` |
    /// | `ENTITLE_CACHE_TTL` | `cache_ttl_secs` |
    /// | `ENTITLE_STALE_CEILING` | `stale_ceiling_secs` |
    pub fn load(path: Option<&Path>) -> ServiceResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("ENTITLE_AUTHORITY_URL") {
            if !url.trim().is_empty() {
                self.authority_url = Some(url);
            }
        }
        if let Ok(db) = std::env::var("ENTITLE_DB") {
            if !db.trim().is_empty() {
                self.database_path = PathBuf::from(db);
            }
        }
        if let Some(secs) = env_parse("ENTITLE_TIMEOUT") {
            self.client.timeout_secs = secs;
        }
        if let Some(retries) = env_parse("ENTITLE_MAX_RETRIES") {
            self.client.max_retries = retries;
        }
        if let Some(secs) = env_parse("ENTITLE_CACHE_TTL") {
            self.cache_ttl_secs = secs;
        }
        if let Some(secs) = env_parse("ENTITLE_STALE_CEILING") {
            self.stale_ceiling_secs = secs;
        }
        self
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if let Some(url) = &self.authority_url {
            validate_base_url(url).map_err(|e| ServiceError::Config {
                message: e.to_string(),
            })?;
        }
        for (name, secs) in [
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("stale_ceiling_secs", self.stale_ceiling_secs),
            ("lead_cooldown_secs", self.lead_cooldown_secs),
        ] {
            if secs > MAX_WINDOW_SECS {
                return Err(ServiceError::Config {
                    message: format!("{} ({}) exceeds {}", name, secs, MAX_WINDOW_SECS),
                });
            }
        }
        if self.stale_ceiling_secs < self.cache_ttl_secs {
            return Err(ServiceError::Config {
                message: format!(
                    "stale_ceiling_secs ({}) must not be below cache_ttl_secs ({})",
                    self.stale_ceiling_secs, self.cache_ttl_secs
                ),
            });
        }
        if let Some(bad) = self
            .catalog
            .iter()
            .find(|m| !crate::entitlement::is_valid_module_key(&m.key))
        {
            return Err(ServiceError::Config {
                message: format!("invalid module key in catalog: '{}'", bad.key),
            });
        }
        Ok(())
    }

    pub fn with_authority_url(mut self, url: impl Into<String>) -> Self {
        self.authority_url = Some(url.into());
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_cache_ttl(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    pub fn with_stale_ceiling(mut self, secs: u64) -> Self {
        self.stale_ceiling_secs = secs;
        self
    }

    pub fn with_lead_cooldown(mut self, secs: u64) -> Self {
        self.lead_cooldown_secs = secs;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.client = self.client.with_timeout(secs);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.client = self.client.with_max_retries(retries);
        self
    }

    pub fn with_catalog(mut self, catalog: Vec<CatalogModule>) -> Self {
        self.catalog = catalog;
        self
    }
}
