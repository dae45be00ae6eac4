//! OAuth 2.1 core types and data structures.
//!
//! Defines the grant and token type enums, the directory records, the
//! authorization code record held by the code store, and the request/response
//! shapes exchanged with the transport layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::pkce::PkceMethod;

/// OAuth 2.1 Grant Types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
}

impl GrantType {
    /// Parse the `grant_type` form value, returning `None` for anything unsupported.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(GrantType::AuthorizationCode),
            "client_credentials" => Some(GrantType::ClientCredentials),
            _ => None,
        }
    }
}

/// OAuth 2.1 Token Types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Bearer,
}

/// Registered client, loaded once per process from the client directory.
#[derive(Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier; always set to the directory key
    #[serde(default)]
    pub client_id: String,
    /// Shared secret used by the client credentials grant
    pub client_secret: String,
    /// Client name
    #[serde(default)]
    pub name: String,
    /// Free-form client type label
    #[serde(rename = "type", default)]
    pub client_type: String,
    /// Client description
    #[serde(default)]
    pub description: String,
    /// Where the authorization step sends the user agent; falls back to the
    /// deployment default when unset
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("name", &self.name)
            .field("client_type", &self.client_type)
            .field("description", &self.description)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Resource owner, loaded once per process from the user directory.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    /// Username; always set to the directory key
    #[serde(default)]
    pub username: String,
    pub password: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Who an authorization code was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeOwner {
    /// Client that started the authorization flow
    pub client_id: String,
    /// Authenticated resource owner
    pub subject: String,
}

/// OAuth Authorization Code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The authorization code
    pub code: String,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Code challenge for PKCE; empty when no binding was requested
    pub code_challenge: String,
    /// Code challenge method for PKCE
    pub code_challenge_method: PkceMethod,
    /// Client-supplied state echoed on redirect
    pub state: String,
    /// Client and resource owner the code was issued to
    pub owner: CodeOwner,
}

impl AuthorizationCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Short prefix of the code, safe to put in log lines.
    pub fn log_prefix(&self) -> &str {
        let end = self
            .code
            .char_indices()
            .nth(6)
            .map(|(index, _)| index)
            .unwrap_or(self.code.len());
        &self.code[..end]
    }
}

/// Authorization endpoint request, including the resource owner's credentials.
#[derive(Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub state: Option<String>,
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("response_type", &self.response_type)
            .field("client_id", &self.client_id)
            .field("code_challenge", &self.code_challenge)
            .field("code_challenge_method", &self.code_challenge_method)
            .field("state", &self.state)
            .finish()
    }
}

/// Successful authorization step: where to send the user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeResponse {
    /// Redirect target carrying `code` and `state`
    pub redirect_to: String,
}

/// Token Exchange Request
#[derive(Clone, Default)]
pub struct TokenRequest {
    /// Grant type, unparsed so unknown values can be reported
    pub grant_type: Option<String>,
    /// Authorization code (for authorization_code grant)
    pub code: Option<String>,
    /// Code verifier (for PKCE)
    pub code_verifier: Option<String>,
    /// Client ID
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
    /// Raw `Authorization` header value, if the request carried one
    pub authorization_header: Option<String>,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("code", &self.code.as_ref().map(|_| "[redacted]"))
            .field("code_verifier", &self.code_verifier.as_ref().map(|_| "[redacted]"))
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .field(
                "authorization_header",
                &self.authorization_header.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Access Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    /// Signed access token
    pub access_token: String,
    /// Token type
    pub token_type: TokenType,
    /// Lifetime in seconds, relative to issuance
    pub expires_in: u64,
    /// Reserved; refresh tokens are never issued
    pub refresh_token: String,
}

impl AccessTokenResponse {
    pub fn bearer(access_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            token_type: TokenType::Bearer,
            expires_in,
            refresh_token: String::new(),
        }
    }
}

/// OAuth Error Response
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// Error code
    pub error: String,
    /// Error description
    pub error_description: Option<String>,
}
