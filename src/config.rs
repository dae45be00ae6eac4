//! Environment-based configuration types for grantd runtime settings.

use anyhow::Result;
use url::Url;

use crate::errors::ConfigError;
use crate::oauth::auth_server::{AuthorizationServerSettings, DEFAULT_REDIRECT_URI, SubjectPolicy};
use crate::storage::code_store::{CodeStoreSettings, DEFAULT_CODE_LENGTH, MIN_CODE_LENGTH};

/// HTTP server port configuration
#[derive(Clone, Debug)]
pub struct HttpPort(u16);

/// Authorization code lifetime configuration
#[derive(Clone, Debug)]
pub struct CodeTtl(chrono::Duration);

/// Authorization code length configuration
#[derive(Clone, Debug)]
pub struct CodeLength(usize);

/// Access token lifetime configuration
#[derive(Clone, Debug)]
pub struct AccessTokenTtl(chrono::Duration);

/// Redirect target for clients without a registered redirect URI
#[derive(Clone, Debug)]
pub struct DefaultRedirectUri(Url);

/// Subject claim policy for tokens minted from authorization codes
#[derive(Clone, Debug)]
pub struct TokenSubjectPolicy(SubjectPolicy);

/// Main application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub issuer: String,
    pub code_ttl: CodeTtl,
    pub code_length: CodeLength,
    pub access_token_ttl: AccessTokenTtl,
    pub signing_key_private_path: String,
    pub signing_key_public_path: String,
    pub clients_path: String,
    pub users_path: String,
    pub default_redirect_uri: DefaultRedirectUri,
    pub token_subject_policy: TokenSubjectPolicy,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let issuer = default_env("ISSUER", "http://localhost:8080");
        let code_ttl: CodeTtl = default_env("CODE_TTL", "5m").try_into()?;
        let code_length: CodeLength =
            default_env("CODE_LENGTH", &DEFAULT_CODE_LENGTH.to_string()).try_into()?;
        let access_token_ttl: AccessTokenTtl = default_env("ACCESS_TOKEN_TTL", "1h").try_into()?;
        let signing_key_private_path = default_env("SIGNING_KEY_PRIVATE_PATH", "keys/private.pem");
        let signing_key_public_path = default_env("SIGNING_KEY_PUBLIC_PATH", "keys/public.pub");
        let clients_path = default_env("CLIENTS_PATH", "clients/clients.json");
        let users_path = default_env("USERS_PATH", "clients/users.json");
        let default_redirect_uri: DefaultRedirectUri =
            default_env("DEFAULT_REDIRECT_URI", DEFAULT_REDIRECT_URI).try_into()?;
        let token_subject_policy: TokenSubjectPolicy =
            default_env("TOKEN_SUBJECT_POLICY", "resource_owner").try_into()?;

        Ok(Self {
            version: version()?,
            http_port,
            issuer,
            code_ttl,
            code_length,
            access_token_ttl,
            signing_key_private_path,
            signing_key_public_path,
            clients_path,
            users_path,
            default_redirect_uri,
            token_subject_policy,
        })
    }

    pub fn code_store_settings(&self) -> CodeStoreSettings {
        CodeStoreSettings {
            code_ttl: *self.code_ttl.as_ref(),
            code_length: *self.code_length.as_ref(),
        }
    }

    pub fn authorization_server_settings(&self) -> AuthorizationServerSettings {
        AuthorizationServerSettings {
            access_token_ttl: *self.access_token_ttl.as_ref(),
            default_redirect_uri: self.default_redirect_uri.as_ref().clone(),
            subject_policy: *self.token_subject_policy.as_ref(),
        }
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

fn parse_ttl(value: String) -> Result<chrono::Duration, ConfigError> {
    let duration = duration_str::parse(&value)
        .map_err(|e| ConfigError::DurationParsingFailed(value.clone(), e.to_string()))?;
    if duration.is_zero() {
        return Err(ConfigError::DurationParsingFailed(
            value,
            "must be greater than zero".to_string(),
        ));
    }
    chrono::Duration::from_std(duration)
        .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for CodeTtl {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_ttl(value)?))
    }
}

impl AsRef<chrono::Duration> for CodeTtl {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for CodeLength {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().parse::<usize>() {
            Ok(length) if length >= MIN_CODE_LENGTH => Ok(Self(length)),
            _ => Err(ConfigError::InvalidCodeLength(value, MIN_CODE_LENGTH).into()),
        }
    }
}

impl AsRef<usize> for CodeLength {
    fn as_ref(&self) -> &usize {
        &self.0
    }
}

impl TryFrom<String> for AccessTokenTtl {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_ttl(value)?))
    }
}

impl AsRef<chrono::Duration> for AccessTokenTtl {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for DefaultRedirectUri {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let url = Url::parse(&value).map_err(|e| ConfigError::InvalidRedirectUri(value, e))?;
        Ok(Self(url))
    }
}

impl AsRef<Url> for DefaultRedirectUri {
    fn as_ref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for TokenSubjectPolicy {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "" | "resource_owner" => Ok(Self(SubjectPolicy::ResourceOwner)),
            "client" => Ok(Self(SubjectPolicy::Client)),
            _ => Err(ConfigError::InvalidSubjectPolicy(value).into()),
        }
    }
}

impl AsRef<SubjectPolicy> for TokenSubjectPolicy {
    fn as_ref(&self) -> &SubjectPolicy {
        &self.0
    }
}
