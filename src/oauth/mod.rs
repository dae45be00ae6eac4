//! OAuth 2.0 authorization code and client credentials grants.

pub mod auth_server;
pub mod codegen;
pub mod pkce;
pub mod tokens;
pub mod types;

pub use auth_server::{AuthorizationServer, AuthorizationServerSettings, SubjectPolicy};
pub use pkce::PkceMethod;
pub use tokens::{AccessTokenClaims, TokenIssuer};
pub use types::{
    AccessTokenResponse, AuthorizationCode, AuthorizationRequest, AuthorizeResponse, Client,
    CodeOwner, GrantType, OAuthErrorResponse, TokenRequest, TokenType, User,
};
