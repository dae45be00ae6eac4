//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Implements the `plain` and `S256` transforms of RFC 7636.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::OAuthError;

/// Code challenge method recorded with an authorization code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceMethod {
    /// No PKCE binding was requested
    #[serde(rename = "none")]
    None,
    #[serde(rename = "plain")]
    Plain,
    S256,
}

impl PkceMethod {
    /// Resolve the method for an authorization request.
    ///
    /// An absent method defaults to `plain` when a challenge was supplied
    /// (RFC 7636 section 4.3) and to no binding otherwise.
    pub fn parse(method: Option<&str>, challenge: &str) -> Result<Self, OAuthError> {
        match method {
            Some("S256") => Ok(PkceMethod::S256),
            Some("plain") => Ok(PkceMethod::Plain),
            Some("") | None if challenge.is_empty() => Ok(PkceMethod::None),
            Some("") | None => Ok(PkceMethod::Plain),
            Some(other) => Err(OAuthError::InvalidRequest(format!(
                "Unsupported code_challenge_method: {}",
                other
            ))),
        }
    }
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn challenge_for(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    BASE64_URL_SAFE_NO_PAD.encode(hash)
}

/// Check a supplied code verifier against the stored challenge.
pub fn verify(method: PkceMethod, stored_challenge: &str, supplied_verifier: &str) -> bool {
    match method {
        PkceMethod::None => stored_challenge.is_empty(),
        PkceMethod::Plain => constant_time_eq(supplied_verifier, stored_challenge),
        PkceMethod::S256 => constant_time_eq(&challenge_for(supplied_verifier), stored_challenge),
    }
}

fn constant_time_eq(left: &str, right: &str) -> bool {
    left.as_bytes().ct_eq(right.as_bytes()).into()
}
