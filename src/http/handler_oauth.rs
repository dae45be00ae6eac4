//! Handles POST /oauth/token - Exchanges authorization codes or client credentials for access tokens

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
};
use serde::Deserialize;

use super::{
    context::AppState,
    utils_oauth::{OAuthErrorReply, oauth_error_reply},
};
use crate::oauth::types::{AccessTokenResponse, TokenRequest};

/// Form data for token endpoint
#[derive(Default, Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl TokenForm {
    fn into_request(self, headers: &HeaderMap) -> TokenRequest {
        let authorization_header = headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str().unwrap_or_default().to_string());

        TokenRequest {
            grant_type: self.grant_type,
            code: self.code,
            code_verifier: self.code_verifier,
            client_id: self.client_id,
            client_secret: self.client_secret,
            authorization_header,
        }
    }
}

/// POST /oauth/token
pub async fn handle_oauth_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Result<Json<AccessTokenResponse>, OAuthErrorReply> {
    let request = form.into_request(&headers);

    state
        .auth_server
        .exchange_token(request)
        .map(Json)
        .map_err(oauth_error_reply)
}
