//! Standardized error types following the `error-grantd-<domain>-<number>` format.

use thiserror::Error;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when HTTP_PORT cannot be parsed
    #[error("error-grantd-config-1 Parsing HTTP_PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-grantd-config-2 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-grantd-config-3 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when the authorization code length is unusable
    #[error("error-grantd-config-4 Invalid code length '{0}': must be an integer of at least {1}")]
    InvalidCodeLength(String, usize),

    /// Error when the token subject policy is not recognized
    #[error("error-grantd-config-5 Unknown token subject policy '{0}': expected resource_owner or client")]
    InvalidSubjectPolicy(String),

    /// Error when the default redirect URI cannot be parsed
    #[error("error-grantd-config-6 Invalid redirect URI '{0}': {1}")]
    InvalidRedirectUri(String, url::ParseError),
}

/// OAuth-related errors
///
/// Every variant corresponds to exactly one OAuth 2.0 wire error code, see
/// [`OAuthError::error_code`]. The carried message is the human readable
/// `error_description`.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Invalid request
    #[error("error-grantd-oauth-1 Invalid request: {0}")]
    InvalidRequest(String),

    /// Unauthorized client
    #[error("error-grantd-oauth-2 Unauthorized client: {0}")]
    UnauthorizedClient(String),

    /// Access denied
    #[error("error-grantd-oauth-3 Access denied: {0}")]
    AccessDenied(String),

    /// Invalid authorization code
    #[error("error-grantd-oauth-4 Invalid authorization code: {0}")]
    InvalidGrant(String),

    /// Invalid client credentials
    #[error("error-grantd-oauth-5 Invalid client credentials: {0}")]
    InvalidClient(String),

    /// Unsupported grant type
    #[error("error-grantd-oauth-6 Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Unsupported response type
    #[error("error-grantd-oauth-7 Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// Server error
    #[error("error-grantd-oauth-8 Server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// The RFC 6749 `error` value for this failure.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::UnauthorizedClient(_) => "unauthorized_client",
            OAuthError::AccessDenied(_) => "access_denied",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// The description without the internal error prefix.
    pub fn description(&self) -> &str {
        match self {
            OAuthError::InvalidRequest(message)
            | OAuthError::UnauthorizedClient(message)
            | OAuthError::AccessDenied(message)
            | OAuthError::InvalidGrant(message)
            | OAuthError::InvalidClient(message)
            | OAuthError::UnsupportedGrantType(message)
            | OAuthError::UnsupportedResponseType(message)
            | OAuthError::ServerError(message) => message,
        }
    }
}

/// Random code generation errors
#[derive(Debug, Error)]
pub enum CodeGenError {
    /// The operating system random source failed to produce bytes
    #[error("error-grantd-codegen-1 Entropy unavailable: {0}")]
    EntropyUnavailable(String),
}

/// Authorization code store errors
#[derive(Debug, Error)]
pub enum CodeStoreError {
    /// Code was never issued, was already redeemed, or was already reaped
    #[error("error-grantd-store-1 Authorization code not found")]
    NotFound,

    /// Code was found but its expiration has passed
    #[error("error-grantd-store-2 Authorization code expired")]
    Expired,

    /// Code verifier did not satisfy the stored PKCE challenge
    #[error("error-grantd-store-3 PKCE verification failed")]
    PkceMismatch,

    /// Store is shutting down and no longer accepts codes
    #[error("error-grantd-store-4 Code store unavailable")]
    StoreUnavailable,

    /// A new code could not be generated
    #[error("error-grantd-store-5 {0}")]
    Entropy(#[from] CodeGenError),
}

/// Access token signing and verification errors
#[derive(Debug, Error)]
pub enum TokenError {
    /// Signing key pair could not be read or parsed
    #[error("error-grantd-token-1 Signing key unavailable: {0}")]
    SigningKeyUnavailable(String),

    /// Signing failed after the key was loaded
    #[error("error-grantd-token-2 Signing failed: {0}")]
    SigningFailure(String),

    /// Token expiration has passed
    #[error("error-grantd-token-3 Token expired")]
    ExpiredToken,

    /// Signature did not verify against the public key
    #[error("error-grantd-token-4 Invalid token signature")]
    InvalidSignature,

    /// Header names an algorithm other than the one used for issuance
    #[error("error-grantd-token-5 Disallowed token algorithm: {0}")]
    DisallowedAlgorithm(String),

    /// Token could not be parsed or its claims are unusable
    #[error("error-grantd-token-6 Malformed token: {0}")]
    Malformed(String),
}

/// Client and user directory loading errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Directory file could not be read
    #[error("error-grantd-directory-1 Unable to read {0}: {1}")]
    ReadFailed(String, std::io::Error),

    /// Directory file is not valid JSON for the expected shape
    #[error("error-grantd-directory-2 Unable to parse {0}: {1}")]
    ParseFailed(String, serde_json::Error),
}
