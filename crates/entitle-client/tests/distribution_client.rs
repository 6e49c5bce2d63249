//! Integration tests for DistributionClient.
//!
//! Uses wiremock for HTTP mocking. Tests cover signing, bootstrap
//! idempotency, status mapping (401/403/429/5xx), timeouts and retry
//! behavior.

use std::time::Duration;

use chrono::Utc;
use entitle_client::{
    canonical_request, verify_signature, AllowedModules, ClientConfig, ClientError,
    ContractState, Credential, DistributionClient, LeadPayload, LicenseStatus, Plan,
    DEFAULT_TOLERANCE_SECS, HEADER_CLIENT_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP,
    LEAD_RATE_LIMIT_WINDOW,
};
use serial_test::serial;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches only requests carrying a valid, fresh signature for `secret`.
struct ValidSignature {
    secret: &'static str,
}

impl Match for ValidSignature {
    fn matches(&self, request: &Request) -> bool {
        let get = |name: &str| request.headers.get(name).and_then(|v| v.to_str().ok());
        let (Some(client_id), Some(timestamp), Some(signature)) = (
            get(HEADER_CLIENT_ID),
            get(HEADER_TIMESTAMP),
            get(HEADER_SIGNATURE),
        ) else {
            return false;
        };
        let Ok(timestamp) = timestamp.parse::<i64>() else {
            return false;
        };
        let canonical = canonical_request(
            request.method.as_str(),
            request.url.path(),
            timestamp,
            client_id,
            &request.body,
        );
        verify_signature(
            self.secret,
            &canonical,
            signature,
            timestamp,
            Utc::now().timestamp(),
            DEFAULT_TOLERANCE_SECS,
        )
    }
}

fn create_test_client() -> DistributionClient {
    DistributionClient::new(ClientConfig::default().with_max_retries(0))
        .expect("failed to create client")
}

fn credential(mock_server: &MockServer, secret: &str) -> Credential {
    Credential::new(mock_server.uri(), "env-1", Some(secret.to_string()))
}

fn lead() -> LeadPayload {
    LeadPayload {
        name: "Ada".into(),
        email: "ada@example.com".into(),
        company: None,
        message: "Interested in the survey module".into(),
        modules: vec!["survey".into()],
    }
}

#[tokio::test]
async fn test_validate_success_with_valid_signature() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/validate"))
        .and(ValidSignature { secret: "s3cret" })
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "valid": true,
            "plan": "PRO",
            "contract_active": true,
            "license_status": "ACTIVE",
            "allowed_modules": ["survey", "assets"],
            "warnings": ["renewal due in 10 days"]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client();
    let response = client
        .validate(
            &credential(&mock_server, "s3cret"),
            &["survey".to_string()],
            serde_json::json!({"origin": "admin"}),
        )
        .await
        .expect("validate failed");

    assert!(response.valid);
    assert_eq!(response.plan, Plan::Pro);
    assert_eq!(response.contract_active, ContractState::Active);
    assert_eq!(response.license_status, LicenseStatus::Active);
    assert_eq!(
        response.allowed_modules,
        AllowedModules::from_keys(["survey", "assets"])
    );
    assert_eq!(response.warnings, vec!["renewal due in 10 days".to_string()]);

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["client_id"], "env-1");
    assert_eq!(body["requested_modules"], serde_json::json!(["survey"]));
    assert_eq!(body["context"]["origin"], "admin");
}

#[tokio::test]
async fn test_signature_mismatch_is_auth_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/validate"))
        .and(ValidSignature { secret: "right" })
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"valid": true})))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"message": "bad signature"})),
        )
        .mount(&mock_server)
        .await;

    let result = create_test_client()
        .validate(
            &credential(&mock_server, "wrong"),
            &[],
            serde_json::Value::Null,
        )
        .await;

    match result {
        Err(ClientError::Unauthorized { message }) => assert_eq!(message, "bad signature"),
        other => panic!("expected Unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_fields_make_no_requests() {
    let mock_server = MockServer::start().await;
    let client = create_test_client();

    let no_url = Credential::new("", "env-1", Some("s".into()));
    let result = client
        .validate(&no_url, &[], serde_json::Value::Null)
        .await;
    assert!(matches!(
        result,
        Err(ClientError::NotConfigured { missing: "base_url" })
    ));

    let no_secret = Credential::new(mock_server.uri(), "env-1", None);
    let result = client
        .validate(&no_secret, &[], serde_json::Value::Null)
        .await;
    assert!(matches!(
        result,
        Err(ClientError::NotConfigured {
            missing: "client_secret"
        })
    ));

    let result = client.submit_lead(&no_secret, &lead()).await;
    assert!(matches!(result, Err(ClientError::NotConfigured { .. })));

    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_authority_rejection_carries_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "valid": false,
            "license_status": "EXPIRED",
            "plan": "PRO",
            "message": "license expired on 2024-01-01"
        })))
        .mount(&mock_server)
        .await;

    let result = create_test_client()
        .validate(
            &credential(&mock_server, "s3cret"),
            &[],
            serde_json::Value::Null,
        )
        .await;

    match result {
        Err(ClientError::AuthorityRejected {
            status,
            message,
            response,
        }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "license expired on 2024-01-01");
            let body = response.expect("expected parsed body");
            assert_eq!(body.license_status, LicenseStatus::Expired);
        }
        other => panic!("expected AuthorityRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limit_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "120"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = DistributionClient::new(ClientConfig::default().with_max_retries(3)).unwrap();
    let result = client
        .validate(
            &credential(&mock_server, "s3cret"),
            &[],
            serde_json::Value::Null,
        )
        .await;

    match result {
        Err(ClientError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(120)));
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_lead_rate_limit_defaults_to_thirty_minutes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/leads"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = create_test_client()
        .submit_lead(&credential(&mock_server, "s3cret"), &lead())
        .await;

    match result {
        Err(ClientError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Some(LEAD_RATE_LIMIT_WINDOW));
            assert_eq!(LEAD_RATE_LIMIT_WINDOW, Duration::from_secs(1800));
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_lead_submission_returns_ticket() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/leads"))
        .and(ValidSignature { secret: "s3cret" })
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"ticket_id": "T-42"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let receipt = create_test_client()
        .submit_lead(&credential(&mock_server, "s3cret"), &lead())
        .await
        .expect("lead failed");
    assert_eq!(receipt.ticket_id, "T-42");
}

#[tokio::test]
async fn test_bootstrap_returns_existing_secret_as_reused() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bootstrap-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "secret": "provisioned",
            "reused": false
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bootstrap-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "secret": "provisioned",
            "reused": true
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client();
    let first = client
        .bootstrap_secret(&mock_server.uri(), "env-1")
        .await
        .unwrap();
    let second = client
        .bootstrap_secret(&mock_server.uri(), "env-1")
        .await
        .unwrap();

    assert_eq!(first.secret, second.secret);
    assert!(!first.reused);
    assert!(second.reused);
}

#[tokio::test]
async fn test_bootstrap_rejected_is_auth_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bootstrap-secret"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let result = create_test_client()
        .bootstrap_secret(&mock_server.uri(), "env-1")
        .await;
    assert!(matches!(result, Err(ClientError::Unauthorized { .. })));
}

#[tokio::test]
async fn test_timeout_is_network_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"valid": true}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let client = DistributionClient::new(
        ClientConfig::default()
            .with_timeout(1)
            .with_max_retries(0),
    )
    .unwrap();
    let result = client
        .validate(
            &credential(&mock_server, "s3cret"),
            &[],
            serde_json::Value::Null,
        )
        .await;

    match result {
        Err(e @ ClientError::Network { .. }) => {
            assert!(e.is_retryable());
            assert_eq!(e.kind(), "network");
        }
        other => panic!("expected Network, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = DistributionClient::new(ClientConfig::default().with_max_retries(1)).unwrap();
    let result = client
        .validate(
            &credential(&mock_server, "s3cret"),
            &[],
            serde_json::Value::Null,
        )
        .await;
    assert!(matches!(result, Err(ClientError::Network { .. })));
}

#[tokio::test]
async fn test_garbage_success_body_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captive portal</html>"))
        .mount(&mock_server)
        .await;

    let result = create_test_client()
        .validate(
            &credential(&mock_server, "s3cret"),
            &[],
            serde_json::Value::Null,
        )
        .await;
    assert!(matches!(result, Err(ClientError::InvalidResponse { .. })));
}

#[tokio::test]
async fn test_bad_request_is_not_a_license_rejection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({ "error": "malformed request" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = create_test_client()
        .validate(
            &credential(&mock_server, "s3cret"),
            &[],
            serde_json::Value::Null,
        )
        .await;
    match result {
        Err(ClientError::InvalidResponse { message }) => {
            assert_eq!(message, "HTTP 400: malformed request");
        }
        other => panic!("expected InvalidResponse, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_config_from_env() {
    std::env::set_var("ENTITLE_TIMEOUT", "7");
    std::env::set_var("ENTITLE_MAX_RETRIES", "not-a-number");
    let config = ClientConfig::from_env();
    std::env::remove_var("ENTITLE_TIMEOUT");
    std::env::remove_var("ENTITLE_MAX_RETRIES");

    assert_eq!(config.timeout_secs, 7);
    assert_eq!(config.max_retries, 2);
}
