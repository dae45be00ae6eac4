//! Axum HTTP transport for the OAuth endpoints.

pub mod context;
mod handler_authorize;
mod handler_oauth;
pub mod server;
mod utils_oauth;

pub use context::AppState;
pub use handler_oauth::TokenForm;
pub use server::build_router;
pub use utils_oauth::status_for;
