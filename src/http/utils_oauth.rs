//! Mapping of OAuth errors onto HTTP responses.

use axum::{Json, http::StatusCode};

use crate::errors::OAuthError;
use crate::oauth::types::OAuthErrorResponse;

/// Error half of every OAuth handler's return type.
pub type OAuthErrorReply = (StatusCode, Json<OAuthErrorResponse>);

/// HTTP status for an OAuth error code.
pub fn status_for(error: &OAuthError) -> StatusCode {
    match error {
        OAuthError::InvalidClient(_) | OAuthError::UnauthorizedClient(_) => {
            StatusCode::UNAUTHORIZED
        }
        OAuthError::AccessDenied(_) => StatusCode::FORBIDDEN,
        OAuthError::InvalidRequest(_)
        | OAuthError::InvalidGrant(_)
        | OAuthError::UnsupportedGrantType(_)
        | OAuthError::UnsupportedResponseType(_) => StatusCode::BAD_REQUEST,
        OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn oauth_error_reply(error: OAuthError) -> OAuthErrorReply {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, "oauth request failed");
    } else {
        tracing::debug!(error = %error, "oauth request rejected");
    }

    (
        status,
        Json(OAuthErrorResponse {
            error: error.error_code().to_string(),
            error_description: Some(error.description().to_string()),
        }),
    )
}
