//! Distribution client for the licensing authority.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};

use crate::auth::Credential;
use crate::error::{ClientError, ClientResult};
use crate::types::{
    BootstrapRequest, BootstrapResponse, ClientConfig, LeadPayload, LeadReceipt, ValidateRequest,
    ValidateResponse,
};

mod helpers;
mod http;

pub use http::LEAD_RATE_LIMIT_WINDOW;

use http::{read_json, Endpoint, HttpBackend, RevokeOutcome};

pub const CLIENT_USER_AGENT: &str = concat!("entitle-client/", env!("CARGO_PKG_VERSION"));

/// Client for the licensing authority.
///
/// The base URL and secret travel with each call in a [`Credential`] since
/// both can change while the process runs (configuration, rotation).
#[derive(Debug, Clone)]
pub struct DistributionClient {
    http: HttpBackend,
}

impl DistributionClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ClientError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http: HttpBackend { client, config },
        })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.http.config
    }

    /// Provision (or fetch the existing) shared secret for an identifier.
    ///
    /// Idempotent on the authority side: when a secret already exists the
    /// same value comes back with `reused = true`.
    pub async fn bootstrap_secret(
        &self,
        base_url: &str,
        client_identifier: &str,
    ) -> ClientResult<BootstrapResponse> {
        let identity = Credential::new(base_url, client_identifier, None);
        let (base_url, client_id) = identity.require_identity()?;
        debug!(base_url, client_id, "bootstrapping client secret");

        let body = encode(&BootstrapRequest {
            client_id: client_id.to_string(),
        })?;
        let response = self
            .http
            .request(base_url, Endpoint::BootstrapSecret, None, &body)
            .await?;
        let bootstrap: BootstrapResponse = read_json(response, "bootstrap").await?;

        if bootstrap.secret.is_empty() {
            return Err(ClientError::InvalidResponse {
                message: "bootstrap returned an empty secret".to_string(),
            });
        }

        info!(client_id, reused = bootstrap.reused, "client secret bootstrapped");
        Ok(bootstrap)
    }

    /// Ask the authority whether this environment is entitled.
    pub async fn validate(
        &self,
        credential: &Credential,
        requested_modules: &[String],
        context: serde_json::Value,
    ) -> ClientResult<ValidateResponse> {
        let (base_url, client_id, _) = credential.require_signing()?;

        let body = encode(&ValidateRequest {
            client_id: client_id.to_string(),
            requested_modules: requested_modules.to_vec(),
            context,
        })?;
        let response = self
            .http
            .request_with_retry(base_url, Endpoint::Validate, Some(credential), &body)
            .await?;
        let validated: ValidateResponse = read_json(response, "validate").await?;

        debug!(
            valid = validated.valid,
            plan = %validated.plan,
            contract = %validated.contract_active,
            status = %validated.license_status,
            "validation response"
        );
        Ok(validated)
    }

    /// Submit a contact lead. Never retried: the authority rate limits
    /// submissions per client.
    pub async fn submit_lead(
        &self,
        credential: &Credential,
        payload: &LeadPayload,
    ) -> ClientResult<LeadReceipt> {
        let (base_url, _, _) = credential.require_signing()?;
        let body = encode(payload)?;
        let response = self
            .http
            .request(base_url, Endpoint::Leads, Some(credential), &body)
            .await?;
        read_json(response, "lead").await
    }

    /// Revoke the current secret. Returns false when none was provisioned.
    pub async fn delete_secret(&self, credential: &Credential) -> ClientResult<bool> {
        credential.require_signing()?;
        let outcome = self.http.revoke_secret(credential).await?;
        info!(
            client_id = %credential.client_identifier,
            revoked = outcome == RevokeOutcome::Revoked,
            "client secret revocation"
        );
        Ok(outcome == RevokeOutcome::Revoked)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> ClientResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ClientError::InvalidResponse {
        message: format!("failed to encode request: {}", e),
    })
}
