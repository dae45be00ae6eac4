//! grantd library crate.
//!
//! Issues single-use, PKCE-bound authorization codes from an in-memory store
//! with a background reaper, and exchanges codes or client credentials for
//! RS256 signed access tokens.

pub mod config;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod storage;
