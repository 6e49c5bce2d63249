//! Request authentication for the licensing authority.
//!
//! Every authenticated request carries three headers:
//!
//! | Header | Value |
//! |--------|-------|
//! | `x-entitle-client` | client identifier |
//! | `x-entitle-timestamp` | Unix seconds at signing time |
//! | `x-entitle-signature` | hex HMAC-SHA256(secret, canonical request) |
//!
//! The canonical request is five lines joined by `\n`:
//!
//! ```text
//! POST
//! /validate
//! 1767225600
//! 6f1c2a0e-...-client-id
//! <hex sha256 of the body>
//! ```
//!
//! The authority rejects timestamps outside its tolerance window, so a
//! captured request cannot be replayed later.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{ClientError, ClientResult};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_CLIENT_ID: &str = "x-entitle-client";
pub const HEADER_TIMESTAMP: &str = "x-entitle-timestamp";
pub const HEADER_SIGNATURE: &str = "x-entitle-signature";

/// Default replay tolerance window (seconds) on either side of "now".
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Credential for the licensing authority.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    /// Authority base URL.
    pub base_url: String,

    /// Stable per-environment identifier.
    pub client_identifier: String,

    /// Shared secret; absent until bootstrap.
    pub client_secret: Option<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("base_url", &self.base_url)
            .field("client_identifier", &self.client_identifier)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credential {
    pub fn new(
        base_url: impl Into<String>,
        client_identifier: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client_identifier: client_identifier.into(),
            client_secret,
        }
    }

    /// Replace the secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    pub fn has_base_url(&self) -> bool {
        !self.base_url().is_empty()
    }

    pub fn has_secret(&self) -> bool {
        self.client_secret
            .as_deref()
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    /// Fields needed for bootstrap (no secret yet).
    pub(crate) fn require_identity(&self) -> ClientResult<(&str, &str)> {
        if !self.has_base_url() {
            return Err(ClientError::NotConfigured {
                missing: "base_url",
            });
        }
        if self.client_identifier.trim().is_empty() {
            return Err(ClientError::NotConfigured {
                missing: "client_identifier",
            });
        }
        Ok((self.base_url(), self.client_identifier.trim()))
    }

    /// All fields needed to sign a request. Fails closed on any empty field.
    pub(crate) fn require_signing(&self) -> ClientResult<(&str, &str, &str)> {
        let (base_url, client_id) = self.require_identity()?;
        match self.client_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok((base_url, client_id, secret)),
            _ => Err(ClientError::NotConfigured {
                missing: "client_secret",
            }),
        }
    }
}

/// Signature headers for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub client_id: String,
    pub timestamp: i64,
    pub signature: String,
}

/// Build the canonical request string.
pub fn canonical_request(
    method: &str,
    path: &str,
    timestamp: i64,
    client_id: &str,
    body: &[u8],
) -> String {
    let body_hash = hex::encode(Sha256::digest(body));
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        path,
        timestamp,
        client_id,
        body_hash
    )
}

/// HMAC-SHA256 of the canonical request, lowercase hex.
pub fn sign(secret: &str, canonical: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Check a signature and its timestamp window.
///
/// The MAC comparison is constant time.
pub fn verify_signature(
    secret: &str,
    canonical: &str,
    signature_hex: &str,
    timestamp: i64,
    now: i64,
    tolerance_secs: i64,
) -> bool {
    if (now - timestamp).abs() > tolerance_secs {
        return false;
    }
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(canonical.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Sign a request for `credential`.
pub fn sign_request(
    credential: &Credential,
    method: &str,
    path: &str,
    body: &[u8],
    timestamp: i64,
) -> ClientResult<SignedHeaders> {
    let (_, client_id, secret) = credential.require_signing()?;
    let canonical = canonical_request(method, path, timestamp, client_id, body);
    Ok(SignedHeaders {
        client_id: client_id.to_string(),
        timestamp,
        signature: sign(secret, &canonical),
    })
}

/// Short, non-reversible fingerprint of a secret for logs and audit rows.
pub fn secret_fingerprint(secret: &str) -> String {
    let digest = hex::encode(Sha256::digest(secret.as_bytes()));
    format!("sha256:{}", &digest[..12])
}
