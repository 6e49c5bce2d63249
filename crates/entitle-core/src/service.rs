//! Caller-facing licensing operations.
//!
//! [`LicensingService`] owns every component and is constructed once per
//! process. Each operation authorizes the caller first, then validates
//! its input, and only then touches the store or the network.

use std::time::Duration;

use chrono::Utc;
use entitle_client::{
    secret_fingerprint, ClientError, Credential, DistributionClient, LeadPayload, LeadReceipt,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::{validate_base_url, EntitleConfig};
use crate::entitlement::{is_valid_module_key, EntitlementEngine};
use crate::error::{ServiceError, ServiceResult};
use crate::model::{
    ConfigChange, LicenseResult, ModuleAction, ModuleEntitlement, Origin, ValidationAttempt,
    ValidationContext,
};
use crate::permission::{authorize, Caller, Operation};
use crate::store::{insert_config_change, update_base_url, Store, LEAD_COOLDOWN_KEY};
use crate::validator::LicenseValidator;

const NAME_MAX: usize = 200;
const MESSAGE_MAX: usize = 5000;

/// Result of [`LicensingService::save_configuration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub base_url: String,
    pub changed: bool,
    /// The stored secret was dropped because the authority changed.
    pub secret_cleared: bool,
    pub message: String,
}

/// Result of [`LicensingService::regenerate_secret`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationOutcome {
    /// The authority revoked a secret before issuing the new one.
    pub revoked: bool,
    /// The authority handed back an already provisioned secret.
    pub reused: bool,
    pub fingerprint: String,
    pub message: String,
}

#[derive(Debug)]
pub struct LicensingService {
    config: EntitleConfig,
    store: Store,
    client: DistributionClient,
    validator: LicenseValidator,
    engine: EntitlementEngine,
}

impl LicensingService {
    /// Build the service over an open store, seeding the authority URL and
    /// the static catalog from `config`.
    pub fn new(config: EntitleConfig, store: Store) -> ServiceResult<Self> {
        config.validate()?;
        let client = DistributionClient::new(config.client.clone())?;

        if let Some(url) = &config.authority_url {
            let url = validate_base_url(url)?;
            if store.credentials().seed_base_url(&url)? {
                info!(base_url = %url, "seeded authority URL from configuration");
            }
        }
        if !config.catalog.is_empty() {
            let inserted = store.modules().seed_catalog(&config.catalog)?;
            if inserted > 0 {
                info!(inserted, "seeded module catalog");
            }
        }

        let validator = LicenseValidator::new(
            store.clone(),
            client.clone(),
            config.cache_ttl_secs,
            config.stale_ceiling_secs,
        );
        Ok(Self {
            engine: EntitlementEngine::new(store.clone()),
            validator,
            client,
            store,
            config,
        })
    }

    /// Open the database at `config.database_path`.
    pub fn open(config: EntitleConfig) -> ServiceResult<Self> {
        let store = Store::open(&config.database_path)?;
        Self::new(config, store)
    }

    pub fn config(&self) -> &EntitleConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Point the environment at a licensing authority.
    pub fn save_configuration(&self, caller: &Caller, base_url: &str) -> ServiceResult<SaveOutcome> {
        authorize(caller, Operation::SaveConfiguration)?;
        let base_url = validate_base_url(base_url)?;

        let before = self.store.transaction(|conn| -> ServiceResult<Credential> {
            let before = update_base_url(conn, &base_url)?;
            let changed = before.base_url != base_url;
            let secret_after = if changed { None } else { fingerprint(&before) };
            insert_config_change(
                conn,
                &ConfigChange {
                    timestamp: Utc::now(),
                    actor: caller.actor.clone(),
                    section: "authority".to_string(),
                    before: json!({
                        "base_url": before.base_url,
                        "secret": fingerprint(&before),
                    }),
                    after: json!({
                        "base_url": base_url,
                        "secret": secret_after,
                    }),
                    result: if changed { "updated" } else { "unchanged" }.to_string(),
                },
            )?;
            Ok(before)
        })?;

        let changed = before.base_url != base_url;
        let secret_cleared = changed && before.has_secret();
        let message = match (changed, secret_cleared) {
            (false, _) => "authority URL unchanged".to_string(),
            (true, true) => {
                "authority URL saved; the secret will be provisioned on next validation".to_string()
            }
            (true, false) => "authority URL saved".to_string(),
        };
        info!(actor = %caller.actor, base_url = %base_url, changed, secret_cleared, "configuration saved");

        Ok(SaveOutcome {
            base_url,
            changed,
            secret_cleared,
            message,
        })
    }

    /// Validate the license, from cache when fresh unless `force_refresh`.
    pub async fn validate_license(
        &self,
        caller: &Caller,
        force_refresh: bool,
        context: ValidationContext,
    ) -> ServiceResult<LicenseResult> {
        authorize(caller, Operation::ValidateLicense)?;
        for key in &context.requested_modules {
            require_module_key(key)?;
        }
        self.validator
            .validate(force_refresh, context, &caller.actor)
            .await
    }

    /// Non-forced validation under the built-in system caller.
    pub async fn scheduled_refresh(&self) -> ServiceResult<LicenseResult> {
        self.validate_license(
            &Caller::system(),
            false,
            ValidationContext::new(Origin::Scheduled),
        )
        .await
    }

    /// Revoke the current secret and provision a new one.
    ///
    /// The old secret stays stored until the new one is written. If
    /// provisioning fails after revocation, the next validation recovers
    /// through the bootstrap path.
    pub async fn regenerate_secret(&self, caller: &Caller) -> ServiceResult<RotationOutcome> {
        authorize(caller, Operation::RegenerateSecret)?;
        let credential = self.store.credentials().load()?;
        if !credential.has_base_url() {
            return Err(ServiceError::NotConfigured {
                message: "licensing authority URL is not configured; set the authority URL"
                    .to_string(),
            });
        }
        let old = fingerprint(&credential);

        let revoked = if credential.has_secret() {
            match self.client.delete_secret(&credential).await {
                Ok(revoked) => revoked,
                // The authority no longer accepts the old secret; nothing to revoke.
                Err(ClientError::Unauthorized { message }) => {
                    warn!(%message, "old secret rejected during revocation");
                    false
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            false
        };

        let bootstrap = match self
            .client
            .bootstrap_secret(credential.base_url(), &credential.client_identifier)
            .await
        {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, revoked, "secret rotation failed after revocation");
                self.store.audit().record_config_change(&ConfigChange {
                    timestamp: Utc::now(),
                    actor: caller.actor.clone(),
                    section: "secret".to_string(),
                    before: json!({ "secret": old }),
                    after: json!({ "secret": old }),
                    result: format!("failed: {}", e.kind()),
                })?;
                return Err(e.into());
            }
        };

        self.store.credentials().set_secret(&bootstrap.secret)?;
        let new = secret_fingerprint(&bootstrap.secret);
        self.store.audit().record_config_change(&ConfigChange {
            timestamp: Utc::now(),
            actor: caller.actor.clone(),
            section: "secret".to_string(),
            before: json!({ "secret": old }),
            after: json!({ "secret": new }),
            result: if bootstrap.reused { "reused" } else { "rotated" }.to_string(),
        })?;
        info!(actor = %caller.actor, revoked, reused = bootstrap.reused, fingerprint = %new, "client secret regenerated");

        Ok(RotationOutcome {
            revoked,
            reused: bootstrap.reused,
            message: if bootstrap.reused {
                "authority returned the existing secret".to_string()
            } else {
                "client secret regenerated".to_string()
            },
            fingerprint: new,
        })
    }

    /// Submit a contact lead, honouring the local cooldown.
    pub async fn submit_contact_lead(
        &self,
        caller: &Caller,
        payload: LeadPayload,
    ) -> ServiceResult<LeadReceipt> {
        authorize(caller, Operation::SubmitContactLead)?;
        validate_lead(&payload)?;

        let settings = self.store.settings();
        let now = Utc::now();
        let cooldown = Duration::from_secs(self.config.lead_cooldown_secs);
        // Claimed before the request so concurrent submissions cannot both send.
        if let Some(until) =
            settings.claim_deadline(LEAD_COOLDOWN_KEY, now, now + to_chrono(cooldown))?
        {
            let remaining = (until - now).to_std().unwrap_or_default();
            info!(remaining_secs = remaining.as_secs(), "lead submission in cooldown");
            return Err(ServiceError::RateLimited {
                retry_after: Some(remaining),
            });
        }

        let credential = match self.store.credentials().load() {
            Ok(credential) => credential,
            Err(e) => {
                settings.remove(LEAD_COOLDOWN_KEY)?;
                return Err(e.into());
            }
        };
        match self.client.submit_lead(&credential, &payload).await {
            Ok(receipt) => {
                info!(actor = %caller.actor, ticket_id = %receipt.ticket_id, "contact lead submitted");
                Ok(receipt)
            }
            Err(ClientError::RateLimited { retry_after }) => {
                let window = retry_after.unwrap_or(cooldown);
                settings.set_timestamp(LEAD_COOLDOWN_KEY, now + to_chrono(window))?;
                warn!(retry_after_secs = window.as_secs(), "lead submission rate limited");
                Err(ServiceError::RateLimited {
                    retry_after: Some(window),
                })
            }
            Err(e) => {
                settings.remove(LEAD_COOLDOWN_KEY)?;
                Err(e.into())
            }
        }
    }

    pub fn list_modules(&self, caller: &Caller) -> ServiceResult<Vec<ModuleEntitlement>> {
        authorize(caller, Operation::ListModules)?;
        Ok(self.engine.list_modules()?)
    }

    pub fn is_module_usable(&self, caller: &Caller, key: &str) -> ServiceResult<bool> {
        authorize(caller, Operation::IsModuleUsable)?;
        require_module_key(key)?;
        Ok(self.engine.is_module_usable(key)?)
    }

    /// Host tables owned by `key`.
    pub fn get_module_data_tables(&self, caller: &Caller, key: &str) -> ServiceResult<Vec<String>> {
        authorize(caller, Operation::GetModuleDataTables)?;
        require_module_key(key)?;
        Ok(self.engine.data_tables(key)?)
    }

    pub fn install_module(&self, caller: &Caller, key: &str) -> ServiceResult<Option<ModuleAction>> {
        authorize(caller, Operation::InstallModule)?;
        require_module_key(key)?;
        self.engine.install_module(key, &caller.actor)
    }

    pub fn enable_module(&self, caller: &Caller, key: &str) -> ServiceResult<Option<ModuleAction>> {
        authorize(caller, Operation::EnableModule)?;
        require_module_key(key)?;
        self.engine.enable_module(key, &caller.actor)
    }

    pub fn disable_module(&self, caller: &Caller, key: &str) -> ServiceResult<Option<ModuleAction>> {
        authorize(caller, Operation::DisableModule)?;
        require_module_key(key)?;
        self.engine.disable_module(key, &caller.actor)
    }

    pub fn recent_validations(
        &self,
        caller: &Caller,
        limit: usize,
    ) -> ServiceResult<Vec<ValidationAttempt>> {
        authorize(caller, Operation::ReadAudit)?;
        Ok(self.store.audit().recent_validations(limit)?)
    }

    pub fn recent_config_changes(
        &self,
        caller: &Caller,
        limit: usize,
    ) -> ServiceResult<Vec<ConfigChange>> {
        authorize(caller, Operation::ReadAudit)?;
        Ok(self.store.audit().recent_config_changes(limit)?)
    }

    pub fn recent_module_actions(
        &self,
        caller: &Caller,
        limit: usize,
    ) -> ServiceResult<Vec<ModuleAction>> {
        authorize(caller, Operation::ReadAudit)?;
        Ok(self.store.audit().recent_module_actions(limit)?)
    }
}

fn fingerprint(credential: &Credential) -> Option<String> {
    credential.client_secret.as_deref().map(secret_fingerprint)
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365))
}

fn require_module_key(key: &str) -> ServiceResult<()> {
    if is_valid_module_key(key) {
        Ok(())
    } else {
        Err(ServiceError::validation(
            "module_key",
            format!("'{}' must be 1-64 characters of [a-z0-9_-]", key),
        ))
    }
}

fn validate_lead(payload: &LeadPayload) -> ServiceResult<()> {
    let name = payload.name.trim().chars().count();
    if name == 0 || name > NAME_MAX {
        return Err(ServiceError::validation(
            "name",
            format!("must be 1-{} characters", NAME_MAX),
        ));
    }
    if !is_plausible_email(payload.email.trim()) {
        return Err(ServiceError::validation("email", "not a valid address"));
    }
    let message = payload.message.trim().chars().count();
    if message == 0 || message > MESSAGE_MAX {
        return Err(ServiceError::validation(
            "message",
            format!("must be 1-{} characters", MESSAGE_MAX),
        ));
    }
    for key in &payload.modules {
        require_module_key(key)?;
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitle_client::{BillingTier, CatalogModule};

    fn lead() -> LeadPayload {
        LeadPayload {
            name: "Dana".into(),
            email: "dana@example.com".into(),
            company: None,
            message: "Interested in assets".into(),
            modules: vec!["assets".into()],
        }
    }

    fn service() -> LicensingService {
        LicensingService::new(EntitleConfig::default(), Store::memory().unwrap()).unwrap()
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_plausible_email("a@b.co"));
        assert!(is_plausible_email("first.last@mail.example.org"));
        assert!(!is_plausible_email("no-at.example.com"));
        assert!(!is_plausible_email("two@@example.com"));
        assert!(!is_plausible_email("a@localhost"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("a@.com"));
        assert!(!is_plausible_email("a b@example.com"));
    }

    #[test]
    fn test_lead_field_limits() {
        assert!(validate_lead(&lead()).is_ok());

        let mut long_name = lead();
        long_name.name = "x".repeat(NAME_MAX + 1);
        assert!(matches!(
            validate_lead(&long_name),
            Err(ServiceError::Validation { field: "name", .. })
        ));

        let mut blank = lead();
        blank.message = "   ".into();
        assert!(matches!(
            validate_lead(&blank),
            Err(ServiceError::Validation { field: "message", .. })
        ));

        let mut bad_module = lead();
        bad_module.modules = vec!["Assets!".into()];
        assert!(matches!(
            validate_lead(&bad_module),
            Err(ServiceError::Validation {
                field: "module_key",
                ..
            })
        ));
    }

    #[test]
    fn test_new_seeds_authority_and_catalog() {
        let store = Store::memory().unwrap();
        let config = EntitleConfig::default()
            .with_authority_url("https://licensing.test/v1/")
            .with_catalog(vec![CatalogModule {
                key: "survey".into(),
                name: Some("Survey".into()),
                billing_tier: BillingTier::Free,
                enabled: true,
                version: Some("1.0.0".into()),
            }]);
        let service = LicensingService::new(config, store.clone()).unwrap();

        assert_eq!(
            store.credentials().load().unwrap().base_url,
            "https://licensing.test/v1"
        );
        let modules = service.list_modules(&Caller::viewer("bob")).unwrap();
        assert_eq!(modules.len(), 1);
        assert!(modules[0].usable);
    }

    #[test]
    fn test_save_configuration_audits_and_clears_secret() {
        let service = service();
        let admin = Caller::admin("alice");
        service
            .save_configuration(&admin, "https://one.test")
            .unwrap();
        service.store().credentials().set_secret("s3cret").unwrap();

        let outcome = service
            .save_configuration(&admin, "https://two.test/")
            .unwrap();
        assert!(outcome.changed);
        assert!(outcome.secret_cleared);
        assert_eq!(outcome.base_url, "https://two.test");
        assert!(!service.store().credentials().load().unwrap().has_secret());

        let again = service.save_configuration(&admin, "https://two.test").unwrap();
        assert!(!again.changed);

        let changes = service.recent_config_changes(&admin, 10).unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].result, "unchanged");
        assert_eq!(changes[1].result, "updated");
        assert_eq!(changes[1].before["base_url"], "https://one.test");
        assert_eq!(changes[1].after["secret"], serde_json::Value::Null);
        assert!(changes[1].before["secret"]
            .as_str()
            .unwrap()
            .starts_with("sha256:"));
    }

    #[test]
    fn test_viewer_cannot_save_configuration() {
        let service = service();
        let err = service
            .save_configuration(&Caller::viewer("bob"), "https://one.test")
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!service.store().credentials().load().unwrap().has_base_url());
        assert!(service
            .recent_config_changes(&Caller::viewer("bob"), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_module_key_rejected_at_boundary() {
        let service = service();
        let err = service
            .is_module_usable(&Caller::viewer("bob"), "../etc")
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_regenerate_requires_authority_url() {
        let service = service();
        let err = service
            .regenerate_secret(&Caller::admin("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured { .. }));
    }
}
