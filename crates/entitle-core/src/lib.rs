//! Licensing and module entitlement for a host application.
//!
//! Validates the environment's license against a remote authority,
//! caches the answer in SQLite, and enables or disables paid modules as
//! entitlement changes. When the authority is unreachable the last
//! trusted answer is served up to a staleness ceiling; beyond that the
//! environment degrades to the free tier.
//!
//! # Quick Start
//!
//! ```no_run
//! use entitle_core::{Caller, EntitleConfig, LicensingService, ValidationContext};
//!
//! # async fn example() -> Result<(), entitle_core::ServiceError> {
//! let config = EntitleConfig::load(None)?;
//! let service = LicensingService::open(config)?;
//! let admin = Caller::admin("alice");
//!
//! service.save_configuration(&admin, "https://licensing.example.com/v1")?;
//! let result = service
//!     .validate_license(&admin, true, ValidationContext::default())
//!     .await?;
//! println!("plan: {} valid: {}", result.plan, result.valid);
//!
//! for module in service.list_modules(&admin)? {
//!     println!("{} usable={}", module.key, module.usable);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entitlement;
pub mod error;
pub mod flight;
pub mod model;
pub mod permission;
pub mod service;
pub mod store;
pub mod validator;

pub use config::{validate_base_url, EntitleConfig, MAX_WINDOW_SECS};
pub use entitlement::{
    denial_reason, is_valid_module_key, module_table_prefix, module_usable, EntitlementEngine,
};
pub use error::{ServiceError, ServiceResult, StoreError, StoreResult};
pub use flight::{Landed, SingleFlight};
pub use model::{
    ConfigChange, ErrorKind, LicenseCacheRecord, LicenseResult, ModuleAction, ModuleActionKind,
    ModuleEntitlement, Origin, ResultSource, ValidationAttempt, ValidationContext,
};
pub use permission::{authorize, Caller, Capability, Operation};
pub use service::{LicensingService, RotationOutcome, SaveOutcome};
pub use store::Store;
pub use validator::LicenseValidator;
