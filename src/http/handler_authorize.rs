//! Handles GET and POST /oauth/authorize - Authenticates the resource owner and redirects with a code

use axum::{
    Form,
    extract::{Query, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};

use super::{context::AppState, utils_oauth::oauth_error_reply};
use crate::oauth::types::AuthorizationRequest;

/// GET /oauth/authorize
pub async fn handle_oauth_authorize_get(
    State(state): State<AppState>,
    Query(request): Query<AuthorizationRequest>,
) -> Response {
    authorize(&state, request)
}

/// POST /oauth/authorize
pub async fn handle_oauth_authorize_post(
    State(state): State<AppState>,
    Form(request): Form<AuthorizationRequest>,
) -> Response {
    authorize(&state, request)
}

fn authorize(state: &AppState, request: AuthorizationRequest) -> Response {
    match state.auth_server.start_authorization_flow(request) {
        Ok(response) => (StatusCode::FOUND, [(LOCATION, response.redirect_to)]).into_response(),
        Err(e) => oauth_error_reply(e).into_response(),
    }
}
