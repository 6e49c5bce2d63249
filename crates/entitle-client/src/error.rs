//! Error types for the distribution client.

use std::time::Duration;

use crate::types::ValidateResponse;

/// Distribution client errors.
///
/// Every transport, auth and status-level failure is converted into one of
/// these variants at the client boundary.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A field required for the request is empty.
    #[error("not configured: missing {missing}")]
    NotConfigured { missing: &'static str },

    /// Signature or bootstrap rejected (401). The environment is not
    /// provisioned yet or its secret was revoked.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rejected because of request frequency.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeout, DNS failure, refused connection or a 5xx answer.
    #[error("network error: {message}")]
    Network { message: String },

    /// Well-formed answer saying the license is invalid, expired or not
    /// authorized for this environment.
    #[error("rejected by authority (HTTP {status}): {message}")]
    AuthorityRejected {
        status: u16,
        message: String,
        response: Option<Box<ValidateResponse>>,
    },

    /// Success status with a body we could not understand.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl ClientError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotConfigured { .. } => 1,
            Self::Unauthorized { .. } => 2,
            Self::AuthorityRejected { .. } => 3,
            Self::RateLimited { .. } => 5,
            Self::Network { .. } => 5,
            Self::InvalidResponse { .. } => 6,
        }
    }

    /// Whether the request may be retried immediately with backoff.
    ///
    /// Rate limits are excluded: the caller has to wait for the window.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "not_configured",
            Self::Unauthorized { .. } => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::Network { .. } => "network",
            Self::AuthorityRejected { .. } => "license_invalid",
            Self::InvalidResponse { .. } => "invalid_response",
        }
    }

    /// HTTP status of the answer that produced this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::RateLimited { .. } => Some(429),
            Self::AuthorityRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        Self::Network { message }
    }
}

/// Result type for distribution client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_is_retryable() {
        assert!(ClientError::Network {
            message: "boom".into()
        }
        .is_retryable());
        assert!(!ClientError::RateLimited { retry_after: None }.is_retryable());
        assert!(!ClientError::Unauthorized {
            message: "no".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_kind_and_status() {
        let err = ClientError::AuthorityRejected {
            status: 403,
            message: "expired".into(),
            response: None,
        };
        assert_eq!(err.kind(), "license_invalid");
        assert_eq!(err.http_status(), Some(403));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            ClientError::NotConfigured { missing: "base_url" }.to_string(),
            "not configured: missing base_url"
        );
    }
}
