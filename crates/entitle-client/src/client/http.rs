//! HTTP layer: signing, status mapping, retry, RevokeOutcome.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::{sign_request, Credential, HEADER_CLIENT_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use crate::error::{ClientError, ClientResult};
use crate::types::{ClientConfig, ValidateResponse};

use super::helpers::{endpoint_url, parse_error_message, parse_retry_after};

/// Window the authority enforces between lead submissions when it does not
/// send `Retry-After`.
pub const LEAD_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Authority endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Validate,
    BootstrapSecret,
    Secret,
    Leads,
}

impl Endpoint {
    pub(crate) fn path(&self) -> &'static str {
        match self {
            Self::Validate => "/validate",
            Self::BootstrapSecret => "/bootstrap-secret",
            Self::Secret => "/secret",
            Self::Leads => "/leads",
        }
    }

    fn method(&self) -> reqwest::Method {
        match self {
            Self::Secret => reqwest::Method::DELETE,
            _ => reqwest::Method::POST,
        }
    }

    fn default_retry_after(&self) -> Option<Duration> {
        match self {
            Self::Leads => Some(LEAD_RATE_LIMIT_WINDOW),
            _ => None,
        }
    }
}

/// Outcome of secret revocation (404 means nothing was provisioned).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RevokeOutcome {
    Revoked,
    NothingToRevoke,
}

/// HTTP backend for making requests (holds reqwest client and config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) config: ClientConfig,
}

impl HttpBackend {
    /// Revoke the current secret; 404 => NothingToRevoke.
    pub(crate) async fn revoke_secret(&self, credential: &Credential) -> ClientResult<RevokeOutcome> {
        let response = self
            .request(credential.base_url(), Endpoint::Secret, Some(credential), &[])
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("no secret provisioned for this client");
            return Ok(RevokeOutcome::NothingToRevoke);
        }
        Ok(RevokeOutcome::Revoked)
    }

    /// Make a request, retrying transient failures with jittered backoff.
    pub(crate) async fn request_with_retry(
        &self,
        base_url: &str,
        endpoint: Endpoint,
        credential: Option<&Credential>,
        body: &[u8],
    ) -> ClientResult<reqwest::Response> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            let result = self.request(base_url, endpoint, credential, body).await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let base_backoff = Duration::from_secs(1 << retries);
                    let base_backoff = base_backoff.min(Duration::from_secs(30));
                    let jittered_ms =
                        rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                    let backoff = Duration::from_millis(jittered_ms.max(10));

                    warn!(
                        error = %e,
                        endpoint = endpoint.path(),
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Make a single request. Signs it when a credential is given.
    pub(crate) async fn request(
        &self,
        base_url: &str,
        endpoint: Endpoint,
        credential: Option<&Credential>,
        body: &[u8],
    ) -> ClientResult<reqwest::Response> {
        let (url, path) = endpoint_url(base_url, endpoint.path())?;
        let method = endpoint.method();
        let mut request = self.client.request(method.clone(), &url);

        if let Some(credential) = credential {
            let signed = sign_request(
                credential,
                method.as_str(),
                &path,
                body,
                Utc::now().timestamp(),
            )?;
            request = request
                .header(HEADER_CLIENT_ID, signed.client_id)
                .header(HEADER_TIMESTAMP, signed.timestamp.to_string())
                .header(HEADER_SIGNATURE, signed.signature);
        }

        if !body.is_empty() {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }

        debug!(url = %url, signed = credential.is_some(), "sending request");
        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response),

            404 if endpoint == Endpoint::Secret => Ok(response),

            401 => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::Unauthorized {
                    message: parse_error_message(&body).unwrap_or_else(|| {
                        "signature rejected or environment not provisioned".to_string()
                    }),
                })
            }

            400 => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::InvalidResponse {
                    message: format!(
                        "HTTP 400: {}",
                        parse_error_message(&body).unwrap_or_else(|| "bad request".to_string())
                    ),
                })
            }

            402 | 403 | 410 | 422 => {
                let body = response.text().await.unwrap_or_default();
                let message =
                    parse_error_message(&body).unwrap_or_else(|| status.to_string());
                let parsed = if endpoint == Endpoint::Validate {
                    serde_json::from_str::<ValidateResponse>(&body)
                        .ok()
                        .map(Box::new)
                } else {
                    None
                };

                Err(ClientError::AuthorityRejected {
                    status: status.as_u16(),
                    message,
                    response: parsed,
                })
            }

            429 => {
                let retry_after =
                    parse_retry_after(response.headers()).or(endpoint.default_retry_after());
                Err(ClientError::RateLimited { retry_after })
            }

            _ => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(ClientError::Network {
                    message: format!("HTTP {}: {}", status.as_u16(), message),
                })
            }
        }
    }
}

/// Decode a success body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> ClientResult<T> {
    let text = response.text().await.map_err(|e| ClientError::Network {
        message: format!("failed to read {} body: {}", what, e),
    })?;
    serde_json::from_str(&text).map_err(|e| ClientError::InvalidResponse {
        message: format!("failed to parse {} response: {}", what, e),
    })
}
