//! Error types for the licensing core.

use std::time::Duration;

use entitle_client::ClientError;
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt stored value in {table}: {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("cannot prepare database location {path}: {message}")]
    Io { path: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt {
            table: "json",
            message: e.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by caller-facing operations.
///
/// Cloneable so a single in-flight validation can hand the same outcome to
/// every waiter.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("not configured: {message}")]
    NotConfigured { message: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("license rejected by authority (HTTP {status}): {message}")]
    AuthorityRejected { status: u16, message: String },

    #[error("permission denied: '{actor}' needs {required} for {operation}")]
    PermissionDenied {
        actor: String,
        operation: &'static str,
        required: &'static str,
    },

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("module '{key}' is not entitled: {reason}")]
    NotEntitled { key: String, reason: String },

    #[error("unknown module: {key}")]
    ModuleNotFound { key: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(": retry after {}s", d.as_secs()),
        None => String::new(),
    }
}

impl ServiceError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotConfigured { .. }
            | Self::Validation { .. }
            | Self::ModuleNotFound { .. }
            | Self::Config { .. } => 1,
            Self::Unauthorized { .. } => 2,
            Self::AuthorityRejected { .. } | Self::NotEntitled { .. } => 3,
            Self::PermissionDenied { .. } => 4,
            Self::RateLimited { .. } | Self::Network { .. } => 5,
            Self::Storage(_) => 6,
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "not_configured",
            Self::Unauthorized { .. } => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::Network { .. } => "network",
            Self::AuthorityRejected { .. } => "license_invalid",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Validation { .. } => "validation",
            Self::NotEntitled { .. } => "not_entitled",
            Self::ModuleNotFound { .. } => "module_not_found",
            Self::Config { .. } => "config",
            Self::Storage(_) => "storage",
        }
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<ClientError> for ServiceError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotConfigured { missing } => Self::NotConfigured {
                message: format!("missing {}", missing),
            },
            ClientError::Unauthorized { message } => Self::Unauthorized { message },
            ClientError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            ClientError::Network { message } => Self::Network { message },
            ClientError::AuthorityRejected {
                status, message, ..
            } => Self::AuthorityRejected { status, message },
            ClientError::InvalidResponse { message } => Self::Network {
                message: format!("invalid response: {}", message),
            },
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
