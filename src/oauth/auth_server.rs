//! Core authorization server handling the authorization code and client credentials grants.

use base64::{Engine, prelude::BASE64_STANDARD};
use chrono::Duration;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use url::Url;

use crate::errors::{CodeStoreError, OAuthError};
use crate::oauth::pkce::PkceMethod;
use crate::oauth::tokens::TokenIssuer;
use crate::oauth::types::*;
use crate::storage::code_store::CodeStore;
use crate::storage::directory::{ClientDirectory, UserDirectory};

/// Default redirect target for clients without a registered redirect URI.
pub const DEFAULT_REDIRECT_URI: &str = "https://oauth.pstmn.io/v1/callback";

/// Every failed code redemption is reported with this description so callers
/// cannot tell an unknown code from an expired or mismatched one.
const INVALID_CODE_DESCRIPTION: &str = "Invalid authorization code or code verifier";

const INVALID_CREDENTIALS_DESCRIPTION: &str = "Invalid username or password";

/// Compared against when the username is unknown; never matches a login.
const UNKNOWN_USER_PASSWORD: &str = "unknown-user-placeholder-password";

/// Who the `sub` claim names for tokens minted from an authorization code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubjectPolicy {
    /// The authenticated resource owner
    #[default]
    ResourceOwner,
    /// The client the code was issued to
    Client,
}

#[derive(Debug, Clone)]
pub struct AuthorizationServerSettings {
    /// Lifetime of issued access tokens
    pub access_token_ttl: Duration,
    /// Redirect target for clients without their own redirect URI
    pub default_redirect_uri: Url,
    pub subject_policy: SubjectPolicy,
}

impl AuthorizationServerSettings {
    /// Settings with a one hour token lifetime and the resource owner as subject.
    pub fn new(default_redirect_uri: Url) -> Self {
        Self {
            access_token_ttl: Duration::hours(1),
            default_redirect_uri,
            subject_policy: SubjectPolicy::default(),
        }
    }
}

/// OAuth 2.0 Authorization Server
pub struct AuthorizationServer {
    code_store: Arc<CodeStore>,
    token_issuer: Arc<TokenIssuer>,
    clients: Arc<dyn ClientDirectory>,
    users: Arc<dyn UserDirectory>,
    settings: AuthorizationServerSettings,
}

/// Client credentials presented at the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

impl AuthorizationServer {
    pub fn new(
        code_store: Arc<CodeStore>,
        token_issuer: Arc<TokenIssuer>,
        clients: Arc<dyn ClientDirectory>,
        users: Arc<dyn UserDirectory>,
        settings: AuthorizationServerSettings,
    ) -> Self {
        Self {
            code_store,
            token_issuer,
            clients,
            users,
            settings,
        }
    }

    pub fn code_store(&self) -> &Arc<CodeStore> {
        &self.code_store
    }

    /// Authenticate the resource owner and issue an authorization code.
    ///
    /// On success the returned redirect carries `code`, `state`, `client_id`
    /// and `grant_type` query parameters.
    pub fn start_authorization_flow(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorizeResponse, OAuthError> {
        match request.response_type.as_deref() {
            Some("code") => {}
            Some("") | None => {
                return Err(OAuthError::InvalidRequest(
                    "Missing response_type".to_string(),
                ));
            }
            Some(other) => {
                return Err(OAuthError::UnsupportedResponseType(format!(
                    "Only 'code' is supported, got '{}'",
                    other
                )));
            }
        }

        let client_id = request
            .client_id
            .as_deref()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("Missing client_id".to_string()))?;

        let code_challenge = request.code_challenge.as_deref().unwrap_or_default();
        let code_challenge_method =
            PkceMethod::parse(request.code_challenge_method.as_deref(), code_challenge)?;

        let username = self.authenticate_user(
            request.username.as_deref().unwrap_or_default(),
            request.password.as_deref().unwrap_or_default(),
        )?;

        let client = self.clients.lookup_client(client_id).ok_or_else(|| {
            tracing::warn!(client_id, "authorization requested for unknown client");
            OAuthError::UnauthorizedClient(format!("Unknown client '{}'", client_id))
        })?;

        let mut redirect_url = match client.redirect_uri.as_deref() {
            Some(redirect_uri) => Url::parse(redirect_uri).map_err(|e| {
                tracing::error!(client_id, error = ?e, "client has an invalid redirect URI");
                OAuthError::ServerError("Client redirect URI is invalid".to_string())
            })?,
            None => self.settings.default_redirect_uri.clone(),
        };

        let state = request.state.as_deref().unwrap_or_default();
        let record = self
            .code_store
            .add(
                code_challenge,
                code_challenge_method,
                state,
                CodeOwner {
                    client_id: client.client_id.clone(),
                    subject: username,
                },
            )
            .map_err(|e| {
                tracing::error!(error = ?e, "failed to issue authorization code");
                OAuthError::ServerError("Unable to issue authorization code".to_string())
            })?;

        redirect_url
            .query_pairs_mut()
            .append_pair("code", &record.code)
            .append_pair("state", state)
            .append_pair("client_id", &client.client_id)
            .append_pair("grant_type", "authorization_code");

        Ok(AuthorizeResponse {
            redirect_to: redirect_url.to_string(),
        })
    }

    fn authenticate_user(&self, username: &str, password: &str) -> Result<String, OAuthError> {
        // Unknown usernames still pay for a password compare.
        let authenticated = match self.users.lookup_user(username) {
            Some(user) => constant_time_eq(&user.password, password).then_some(user),
            None => {
                constant_time_eq(UNKNOWN_USER_PASSWORD, password);
                None
            }
        };

        match authenticated {
            Some(user) => Ok(user.username),
            None => {
                tracing::warn!(username, "resource owner authentication failed");
                Err(OAuthError::AccessDenied(
                    INVALID_CREDENTIALS_DESCRIPTION.to_string(),
                ))
            }
        }
    }

    /// Exchange an authorization code or client credentials for an access token.
    pub fn exchange_token(&self, request: TokenRequest) -> Result<AccessTokenResponse, OAuthError> {
        let grant_type = request
            .grant_type
            .as_deref()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("Missing grant_type".to_string()))?;

        match GrantType::parse(grant_type) {
            Some(GrantType::AuthorizationCode) => self.handle_authorization_code_grant(&request),
            Some(GrantType::ClientCredentials) => self.handle_client_credentials_grant(&request),
            None => Err(OAuthError::UnsupportedGrantType(grant_type.to_string())),
        }
    }

    fn handle_authorization_code_grant(
        &self,
        request: &TokenRequest,
    ) -> Result<AccessTokenResponse, OAuthError> {
        let code = request
            .code
            .as_deref()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("Missing code".to_string()))?;
        let code_verifier = request
            .code_verifier
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing code_verifier".to_string()))?;

        let record = self
            .code_store
            .redeem(code, code_verifier)
            .map_err(|e| {
                match e {
                    CodeStoreError::NotFound
                    | CodeStoreError::Expired
                    | CodeStoreError::PkceMismatch => {
                        tracing::debug!(error = ?e, "authorization code redemption failed")
                    }
                    _ => tracing::error!(error = ?e, "authorization code redemption failed"),
                }
                OAuthError::InvalidGrant(INVALID_CODE_DESCRIPTION.to_string())
            })?;

        if let Some(client_id) = request.client_id.as_deref() {
            if client_id != record.owner.client_id {
                tracing::warn!(
                    client_id,
                    code = record.log_prefix(),
                    "authorization code presented by a different client"
                );
                return Err(OAuthError::InvalidGrant(
                    INVALID_CODE_DESCRIPTION.to_string(),
                ));
            }
        }

        let subject = match self.settings.subject_policy {
            SubjectPolicy::ResourceOwner => record.owner.subject.as_str(),
            SubjectPolicy::Client => record.owner.client_id.as_str(),
        };

        self.issue_access_token(subject, &record.owner.client_id, GrantType::AuthorizationCode)
    }

    fn handle_client_credentials_grant(
        &self,
        request: &TokenRequest,
    ) -> Result<AccessTokenResponse, OAuthError> {
        let credentials = client_credentials(request)?;

        let client = self
            .clients
            .lookup_client(&credentials.client_id)
            .filter(|client| constant_time_eq(&client.client_secret, &credentials.client_secret))
            .ok_or_else(|| {
                tracing::warn!(
                    client_id = %credentials.client_id,
                    "client authentication failed"
                );
                OAuthError::InvalidClient("Client authentication failed".to_string())
            })?;

        self.issue_access_token(
            &client.client_id,
            &client.client_id,
            GrantType::ClientCredentials,
        )
    }

    fn issue_access_token(
        &self,
        subject: &str,
        audience: &str,
        grant_type: GrantType,
    ) -> Result<AccessTokenResponse, OAuthError> {
        let ttl = self.settings.access_token_ttl;
        let access_token = self
            .token_issuer
            .issue(subject, audience, ttl)
            .map_err(|e| {
                tracing::error!(error = ?e, "failed to sign access token");
                OAuthError::ServerError("Unable to issue access token".to_string())
            })?;

        tracing::info!(?grant_type, client_id = audience, "access token issued");

        Ok(AccessTokenResponse::bearer(
            access_token,
            ttl.num_seconds().max(0) as u64,
        ))
    }
}

/// Resolve the client credentials of a token request.
///
/// An `Authorization` header always takes precedence over form fields, even
/// when the form carries credentials too.
pub fn client_credentials(request: &TokenRequest) -> Result<ClientCredentials, OAuthError> {
    if let Some(header) = request.authorization_header.as_deref() {
        return parse_basic_credentials(header).ok_or_else(|| {
            OAuthError::InvalidClient("Malformed Authorization header".to_string())
        });
    }

    match (request.client_id.as_deref(), request.client_secret.as_deref()) {
        (Some(client_id), Some(client_secret)) if !client_id.is_empty() => Ok(ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }),
        _ => Err(OAuthError::InvalidClient(
            "Missing client credentials".to_string(),
        )),
    }
}

/// Decode `Basic base64(client_id:client_secret)`. The `Basic` scheme is
/// matched case-insensitively and may be omitted.
pub fn parse_basic_credentials(header: &str) -> Option<ClientCredentials> {
    let header = header.trim();
    let encoded = match header.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("basic") => rest.trim(),
        _ => header,
    };
    let decoded = BASE64_STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = credentials.split_once(':')?;

    if client_id.is_empty() {
        return None;
    }

    Some(ClientCredentials {
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
    })
}

fn constant_time_eq(left: &str, right: &str) -> bool {
    left.as_bytes().ct_eq(right.as_bytes()).into()
}
