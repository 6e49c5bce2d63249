//! Exit codes for the `entitle` binary.
//! Scripts and schedulers branch on these; they are part of the public contract.

use entitle_core::{ErrorKind, LicenseResult, ServiceError};

pub const SUCCESS: i32 = 0;
pub const INVALID_INPUT: i32 = 1; // Bad flags, config or caller input
pub const AUTH_FAILURE: i32 = 2; // Authority rejected our signature
pub const LICENSE_INVALID: i32 = 3; // License invalid or module not entitled
pub const PERMISSION_DENIED: i32 = 4;
pub const UNAVAILABLE: i32 = 5; // Network failure or rate limited
pub const INTERNAL_ERROR: i32 = 6; // Storage or unexpected failure

/// Exit code for an error that reached `main`.
pub fn from_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ServiceError>() {
        Some(e) => e.exit_code(),
        None => INTERNAL_ERROR,
    }
}

/// Exit code for a validation result; degraded answers are not success.
pub fn for_license(result: &LicenseResult) -> i32 {
    match result.error_kind {
        Some(ErrorKind::NotConfigured) => INVALID_INPUT,
        Some(ErrorKind::Unauthorized) => AUTH_FAILURE,
        Some(ErrorKind::LicenseInvalid) => LICENSE_INVALID,
        Some(ErrorKind::RateLimited | ErrorKind::Network | ErrorKind::InvalidResponse) => {
            UNAVAILABLE
        }
        None if result.valid => SUCCESS,
        None => LICENSE_INVALID,
    }
}
