//! License validator: cache freshness, single-flight refresh, bootstrap
//! recovery and the fail-closed fallback.
//!
//! Outcome table for a remote exchange:
//!
//! | Exchange | Cache | Modules |
//! |----------|-------|---------|
//! | 2xx, license valid | replaced | reconcile, or free tier if the contract is inactive |
//! | 2xx `valid: false`, or rejected (402/403/...) | replaced, fail closed | free tier |
//! | rate limited | untouched, no remote call until `Retry-After` passes | as unavailable |
//! | unavailable, record within ceiling | untouched, served stale | untouched |
//! | unavailable, record past ceiling | replaced, fail closed | free tier |
//! | unavailable, no record | untouched | untouched |

use chrono::{Duration, Utc};
use entitle_client::{ClientError, Credential, DistributionClient, LicenseStatus, ValidateResponse};
use tracing::{debug, info, warn};

use crate::config::MAX_WINDOW_SECS;
use crate::entitlement::{is_valid_module_key, EntitlementEngine};
use crate::error::ServiceResult;
use crate::flight::SingleFlight;
use crate::model::{
    ErrorKind, LicenseCacheRecord, LicenseResult, ResultSource, ValidationAttempt,
    ValidationContext,
};
use crate::store::{Store, VALIDATE_COOLDOWN_KEY};

const NOT_CONFIGURED: &str = "licensing authority URL is not configured; set the authority URL";

/// Outcome of talking to the authority; storage failures stay outside.
type Exchange = Result<ValidateResponse, ClientError>;

/// Orchestrates license validation for one environment.
#[derive(Debug)]
pub struct LicenseValidator {
    store: Store,
    client: DistributionClient,
    engine: EntitlementEngine,
    flights: SingleFlight<ServiceResult<LicenseResult>>,
    cache_ttl: Duration,
    stale_ceiling: Duration,
}

impl LicenseValidator {
    pub fn new(
        store: Store,
        client: DistributionClient,
        cache_ttl_secs: u64,
        stale_ceiling_secs: u64,
    ) -> Self {
        Self {
            engine: EntitlementEngine::new(store.clone()),
            store,
            client,
            flights: SingleFlight::new(),
            cache_ttl: window(cache_ttl_secs),
            stale_ceiling: window(stale_ceiling_secs),
        }
    }

    /// Serve a fresh cache record, or refresh from the authority.
    ///
    /// Concurrent refreshes for the same environment share one remote call.
    pub async fn validate(
        &self,
        force_refresh: bool,
        context: ValidationContext,
        actor: &str,
    ) -> ServiceResult<LicenseResult> {
        let client_id = self.store.credentials().client_identifier()?;

        if !force_refresh {
            if let Some(record) = self.store.license_cache().load(&client_id)? {
                let now = Utc::now();
                if record.is_within(self.cache_ttl, now) {
                    debug!(
                        age_secs = record.age(now).num_seconds(),
                        "serving license from cache"
                    );
                    return Ok(LicenseResult::from_record(&record, ResultSource::Cache, now));
                }
            }
        }

        let landed = self
            .flights
            .run(&client_id, || self.refresh(context, actor))
            .await;
        if !landed.leader {
            debug!("joined in-flight validation");
        }
        landed.value
    }

    async fn refresh(&self, context: ValidationContext, actor: &str) -> ServiceResult<LicenseResult> {
        let mut credential = self.store.credentials().load()?;

        let result = if !credential.has_base_url() {
            warn!("license validation skipped: authority URL not configured");
            LicenseResult::fallback(Utc::now()).with_error(
                ErrorKind::NotConfigured,
                None,
                NOT_CONFIGURED,
            )
        } else if let Some(remaining) = self.cooldown_remaining()? {
            debug!(
                remaining_secs = remaining.as_secs(),
                "validation rate limited; skipping remote call"
            );
            let limited = ClientError::RateLimited {
                retry_after: Some(remaining),
            };
            self.recover(&credential, limited, actor)?
        } else {
            match self.exchange(&mut credential, &context).await? {
                Ok(response) if response.valid => self.accept(&credential, &response, actor)?,
                Ok(response) => self.reject(&credential, &response, actor)?,
                Err(e) => {
                    if let ClientError::RateLimited {
                        retry_after: Some(after),
                    } = &e
                    {
                        let until = Utc::now() + window(after.as_secs());
                        self.store
                            .settings()
                            .set_timestamp(VALIDATE_COOLDOWN_KEY, until)?;
                    }
                    self.recover(&credential, e, actor)?
                }
            }
        };

        self.store.audit().record_validation(&ValidationAttempt {
            timestamp: result.checked_at,
            origin: context.origin,
            outcome: match result.error_kind {
                Some(kind) => kind.as_str().to_string(),
                None if result.valid => "valid".to_string(),
                None => "invalid".to_string(),
            },
            http_status: result.http_status,
            message: result.message.clone(),
        })?;
        Ok(result)
    }

    /// Validate, bootstrapping first when no secret is stored and once
    /// more when the authority answers 401.
    async fn exchange(
        &self,
        credential: &mut Credential,
        context: &ValidationContext,
    ) -> ServiceResult<Exchange> {
        if !credential.has_secret() {
            info!("no client secret stored; bootstrapping");
            if let Err(e) = self.bootstrap(credential).await? {
                return Ok(Err(unprovisioned(e)));
            }
            return Ok(self.call(credential, context).await);
        }

        match self.call(credential, context).await {
            Err(ClientError::Unauthorized { message }) => {
                warn!(%message, "validation unauthorized; bootstrapping and retrying once");
                if let Err(e) = self.bootstrap(credential).await? {
                    return Ok(Err(unprovisioned(e)));
                }
                Ok(self.call(credential, context).await)
            }
            other => Ok(other),
        }
    }

    fn cooldown_remaining(&self) -> ServiceResult<Option<std::time::Duration>> {
        let now = Utc::now();
        Ok(self
            .store
            .settings()
            .get_timestamp(VALIDATE_COOLDOWN_KEY)?
            .filter(|until| *until > now)
            .map(|until| (until - now).to_std().unwrap_or_default()))
    }

    async fn call(&self, credential: &Credential, context: &ValidationContext) -> Exchange {
        self.client
            .validate(credential, &context.requested_modules, context.wire_context())
            .await
    }

    async fn bootstrap(
        &self,
        credential: &mut Credential,
    ) -> ServiceResult<Result<(), ClientError>> {
        let bootstrap = match self
            .client
            .bootstrap_secret(credential.base_url(), &credential.client_identifier)
            .await
        {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "secret bootstrap failed");
                return Ok(Err(e));
            }
        };

        self.store.credentials().set_secret(&bootstrap.secret)?;
        credential.client_secret = Some(bootstrap.secret);
        Ok(Ok(()))
    }

    fn accept(
        &self,
        credential: &Credential,
        response: &ValidateResponse,
        actor: &str,
    ) -> ServiceResult<LicenseResult> {
        let now = Utc::now();
        let record = LicenseCacheRecord::from_response(response, now);
        self.store
            .license_cache()
            .replace(&credential.client_identifier, &record)?;

        self.sync_catalog(response)?;

        if record.valid {
            self.engine.reconcile(actor)?;
        } else {
            self.engine.enforce_free_tier_for_paid_modules(actor)?;
        }

        info!(
            valid = record.valid,
            plan = %record.plan,
            contract = %record.contract_active,
            status = %record.license_status,
            "license validated"
        );
        Ok(LicenseResult::from_record(&record, ResultSource::Remote, now))
    }

    fn sync_catalog(&self, response: &ValidateResponse) -> ServiceResult<()> {
        if let Some(modules) = &response.modules {
            let (catalog, rejected): (Vec<_>, Vec<_>) = modules
                .iter()
                .cloned()
                .partition(|m| is_valid_module_key(&m.key));
            if !rejected.is_empty() {
                warn!(count = rejected.len(), "ignoring catalog entries with invalid keys");
            }
            self.store.modules().replace_catalog(&catalog)?;
        }
        Ok(())
    }

    /// A well-formed answer saying the license is not valid: fail closed.
    fn reject(
        &self,
        credential: &Credential,
        response: &ValidateResponse,
        actor: &str,
    ) -> ServiceResult<LicenseResult> {
        let now = Utc::now();
        let message = response
            .message
            .clone()
            .unwrap_or_else(|| format!("licensing authority reports license {}", response.license_status));
        let record = LicenseCacheRecord::fail_closed(
            response.license_status.clone(),
            Some(message.clone()),
            Some(200),
            now,
        );
        self.store
            .license_cache()
            .replace(&credential.client_identifier, &record)?;
        self.sync_catalog(response)?;
        self.engine.enforce_free_tier_for_paid_modules(actor)?;
        warn!(status = %response.license_status, %message, "license invalid; free tier enforced");
        Ok(LicenseResult::from_record(&record, ResultSource::Remote, now).with_error(
            ErrorKind::LicenseInvalid,
            Some(200),
            message,
        ))
    }

    fn recover(
        &self,
        credential: &Credential,
        error: ClientError,
        actor: &str,
    ) -> ServiceResult<LicenseResult> {
        let now = Utc::now();
        let kind = ErrorKind::from(&error);
        let http_status = error.http_status();
        let client_id = &credential.client_identifier;

        if let ClientError::AuthorityRejected {
            status,
            message,
            response,
        } = error
        {
            let license_status = response
                .map(|r| r.license_status)
                .unwrap_or(LicenseStatus::Unknown);
            let record =
                LicenseCacheRecord::fail_closed(license_status, Some(message.clone()), Some(status), now);
            self.store.license_cache().replace(client_id, &record)?;
            self.engine.enforce_free_tier_for_paid_modules(actor)?;
            warn!(status, %message, "license rejected by authority; free tier enforced");
            return Ok(LicenseResult::from_record(&record, ResultSource::Remote, now)
                .with_error(kind, Some(status), message));
        }

        let detail = describe(&error);
        match self.store.license_cache().load(client_id)? {
            Some(record) if record.is_within(self.stale_ceiling, now) => {
                warn!(
                    error = %error,
                    age_secs = record.age(now).num_seconds(),
                    "authority unavailable; serving cached entitlement"
                );
                Ok(LicenseResult::from_record(&record, ResultSource::StaleCache, now)
                    .with_error(kind, http_status, format!("{}; using cached entitlement", detail)))
            }
            Some(expired) => {
                warn!(
                    error = %error,
                    age_secs = expired.age(now).num_seconds(),
                    "cached entitlement past staleness ceiling; free tier enforced"
                );
                let record = LicenseCacheRecord::fail_closed(
                    LicenseStatus::Unknown,
                    Some(detail.clone()),
                    http_status,
                    now,
                );
                self.store.license_cache().replace(client_id, &record)?;
                self.engine.enforce_free_tier_for_paid_modules(actor)?;
                Ok(LicenseResult::from_record(&record, ResultSource::Fallback, now).with_error(
                    kind,
                    http_status,
                    format!("{}; cached entitlement expired, paid modules disabled", detail),
                ))
            }
            None => {
                warn!(error = %error, "authority unavailable and nothing cached");
                Ok(LicenseResult::fallback(now).with_error(
                    kind,
                    http_status,
                    format!("{}; no cached entitlement", detail),
                ))
            }
        }
    }
}

/// Clamp a configured window so it always fits a `chrono::Duration`.
fn window(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

/// A failed bootstrap leaves the environment unprovisioned.
fn unprovisioned(error: ClientError) -> ClientError {
    match error {
        ClientError::Unauthorized { .. } => error,
        other => ClientError::Unauthorized {
            message: format!("secret bootstrap failed: {}", other),
        },
    }
}

/// Operator-facing text for an unavailable authority.
fn describe(error: &ClientError) -> String {
    match error {
        ClientError::Unauthorized { .. } => {
            "environment is not yet provisioned with the licensing authority, retry shortly"
                .to_string()
        }
        ClientError::RateLimited {
            retry_after: Some(after),
        } => format!(
            "licensing authority is rate limiting this environment, retry in {}s",
            after.as_secs()
        ),
        ClientError::RateLimited { retry_after: None } => {
            "licensing authority is rate limiting this environment".to_string()
        }
        ClientError::Network { message } => format!("licensing authority unreachable: {}", message),
        ClientError::InvalidResponse { message } => {
            format!("licensing authority sent an unreadable answer: {}", message)
        }
        ClientError::NotConfigured { missing } => format!("licensing not configured: missing {}", missing),
        ClientError::AuthorityRejected { message, .. } => message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_describe_distinguishes_remediation() {
        let unauthorized = describe(&ClientError::Unauthorized {
            message: "bad signature".into(),
        });
        assert!(unauthorized.contains("retry shortly"));

        let limited = describe(&ClientError::RateLimited {
            retry_after: Some(StdDuration::from_secs(60)),
        });
        assert!(limited.ends_with("retry in 60s"));

        let network = describe(&ClientError::Network {
            message: "connection refused".into(),
        });
        assert_eq!(network, "licensing authority unreachable: connection refused");
    }

    #[test]
    fn test_failed_bootstrap_maps_to_unauthorized() {
        let mapped = unprovisioned(ClientError::Network {
            message: "HTTP 503: ".into(),
        });
        match mapped {
            ClientError::Unauthorized { message } => {
                assert_eq!(message, "secret bootstrap failed: network error: HTTP 503: ");
            }
            other => panic!("expected Unauthorized, got {:?}", other),
        }
        assert_eq!(window(u64::MAX), Duration::seconds(MAX_WINDOW_SECS as i64));
    }

    #[tokio::test]
    async fn test_cache_hit_makes_no_call() {
        let store = Store::memory().unwrap();
        let client_id = store.credentials().client_identifier().unwrap();
        let record = LicenseCacheRecord::from_response(
            &serde_json::from_value(serde_json::json!({
                "valid": true,
                "plan": "PRO",
                "contract_active": true,
                "license_status": "ACTIVE"
            }))
            .unwrap(),
            Utc::now(),
        );
        store.license_cache().replace(&client_id, &record).unwrap();

        // No base URL: any remote attempt would report not_configured.
        let client = DistributionClient::new(Default::default()).unwrap();
        let validator = LicenseValidator::new(store.clone(), client, 3600, 7200);
        let result = validator
            .validate(false, ValidationContext::default(), "alice")
            .await
            .unwrap();

        assert_eq!(result.source, ResultSource::Cache);
        assert!(result.valid);
        assert!(result.error_kind.is_none());
        assert!(store.audit().recent_validations(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_configured_is_recorded() {
        let store = Store::memory().unwrap();
        let client = DistributionClient::new(Default::default()).unwrap();
        let validator = LicenseValidator::new(store.clone(), client, 3600, 7200);

        let result = validator
            .validate(true, ValidationContext::default(), "alice")
            .await
            .unwrap();
        assert_eq!(result.error_kind, Some(ErrorKind::NotConfigured));
        assert_eq!(result.source, ResultSource::Fallback);
        assert!(!result.valid);

        let attempts = store.audit().recent_validations(10).unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, "not_configured");
    }
}
