//! In-memory storage: the authorization code store and the read-only directories.

pub mod code_store;
pub mod directory;

pub use code_store::{CodeStore, CodeStoreSettings};
pub use directory::{ClientDirectory, StaticDirectory, UserDirectory};
