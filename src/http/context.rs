//! Application state shared with every request handler.

use axum::extract::FromRef;
use std::sync::Arc;

use crate::oauth::auth_server::AuthorizationServer;

#[derive(Clone)]
pub struct AppState {
    /// Grant protocol handler; immutable apart from its code store
    pub auth_server: Arc<AuthorizationServer>,
}

impl AppState {
    pub fn new(auth_server: Arc<AuthorizationServer>) -> Self {
        Self { auth_server }
    }
}

impl FromRef<AppState> for Arc<AuthorizationServer> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_server.clone()
    }
}
