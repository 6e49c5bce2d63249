//! Distribution client for the licensing authority.
//!
//! This crate implements the client side of the licensing protocol:
//!
//! - HMAC-signed requests (client identifier + timestamp + signature)
//! - Secret bootstrap, revocation and lead submission
//! - License validation with typed failure classes
//!
//! Transport, auth and status-level failures never escape as raw
//! `reqwest` errors; they are classified into [`ClientError`] variants.
//!
//! # Quick Start
//!
//! ```no_run
//! use entitle_client::{ClientConfig, Credential, DistributionClient};
//!
//! # async fn example() -> Result<(), entitle_client::ClientError> {
//! let client = DistributionClient::new(ClientConfig::default())?;
//!
//! // First-time provisioning
//! let bootstrap = client
//!     .bootstrap_secret("https://licensing.example.com/v1", "env-1234")
//!     .await?;
//!
//! let credential = Credential::new(
//!     "https://licensing.example.com/v1",
//!     "env-1234",
//!     Some(bootstrap.secret),
//! );
//! let answer = client
//!     .validate(&credential, &["survey".to_string()], serde_json::Value::Null)
//!     .await?;
//! println!("plan: {}", answer.plan);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `ENTITLE_TIMEOUT` | Request timeout in seconds (default: 15) |
//! | `ENTITLE_MAX_RETRIES` | Max retries for transient validate failures (default: 2) |

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

// Re-export main types
pub use auth::{
    canonical_request, secret_fingerprint, sign, sign_request, verify_signature, Credential,
    SignedHeaders, DEFAULT_TOLERANCE_SECS, HEADER_CLIENT_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};
pub use client::{DistributionClient, CLIENT_USER_AGENT, LEAD_RATE_LIMIT_WINDOW};
pub use error::{ClientError, ClientResult};
pub use types::{
    AllowedModules, BillingTier, BootstrapResponse, CatalogModule, ClientConfig, ContractState,
    LeadPayload, LeadReceipt, LicenseRow, LicenseStatus, Plan, ValidateRequest, ValidateResponse,
    ALL_MODULES,
};
