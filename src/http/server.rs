//! Router configuration for the authorization and token endpoints.

use axum::{
    Router,
    body::Body,
    http::Request,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::{
    context::AppState,
    handler_authorize::{handle_oauth_authorize_get, handle_oauth_authorize_post},
    handler_oauth::handle_oauth_token,
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    let oauth_routes = Router::new()
        .route(
            "/authorize",
            get(handle_oauth_authorize_get).post(handle_oauth_authorize_post),
        )
        .route("/token", post(handle_oauth_token));

    Router::new()
        .nest("/oauth", oauth_routes)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(ctx)
}

/// Request span without the query string, which can carry resource owner
/// credentials on GET /oauth/authorize.
fn request_span(request: &Request<Body>) -> Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}
