//! Read-only client and user directories.
//!
//! Both directories are loaded once at startup and shared immutably. The
//! grant handler only ever performs lookups by key.

use std::collections::HashMap;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::errors::DirectoryError;
use crate::oauth::types::{Client, User};

/// Lookup of registered clients by client id.
pub trait ClientDirectory: Send + Sync {
    fn lookup_client(&self, client_id: &str) -> Option<Client>;
}

/// Lookup of resource owners by username.
pub trait UserDirectory: Send + Sync {
    fn lookup_user(&self, username: &str) -> Option<User>;
}

/// Directory backed by in-memory maps.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    clients: HashMap<String, Client>,
    users: HashMap<String, User>,
}

impl StaticDirectory {
    /// Build a directory from maps keyed by client id and username.
    ///
    /// The map key is authoritative: each record's `client_id` or `username`
    /// is overwritten with the key it is stored under.
    pub fn new(clients: HashMap<String, Client>, users: HashMap<String, User>) -> Self {
        let clients = clients
            .into_iter()
            .map(|(key, mut client)| {
                if client.client_id != key {
                    if !client.client_id.is_empty() {
                        tracing::warn!(
                            key = %key,
                            client_id = %client.client_id,
                            "client record id differs from its key, using the key"
                        );
                    }
                    client.client_id = key.clone();
                }
                (key, client)
            })
            .collect();
        let users = users
            .into_iter()
            .map(|(key, mut user)| {
                user.username = key.clone();
                (key, user)
            })
            .collect();

        Self { clients, users }
    }

    /// Load both directories from JSON files.
    pub fn load(
        clients_path: impl AsRef<Path>,
        users_path: impl AsRef<Path>,
    ) -> Result<Self, DirectoryError> {
        let clients = read_json_map(clients_path.as_ref())?;
        let users = read_json_map(users_path.as_ref())?;
        let directory = Self::new(clients, users);

        tracing::info!(
            clients = directory.clients.len(),
            users = directory.users.len(),
            "directories loaded"
        );

        Ok(directory)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

fn read_json_map<T: DeserializeOwned>(path: &Path) -> Result<HashMap<String, T>, DirectoryError> {
    let name = path.display().to_string();
    let contents =
        std::fs::read(path).map_err(|e| DirectoryError::ReadFailed(name.clone(), e))?;
    serde_json::from_slice(&contents).map_err(|e| DirectoryError::ParseFailed(name, e))
}

impl ClientDirectory for StaticDirectory {
    fn lookup_client(&self, client_id: &str) -> Option<Client> {
        self.clients.get(client_id).cloned()
    }
}

impl UserDirectory for StaticDirectory {
    fn lookup_user(&self, username: &str) -> Option<User> {
        self.users.get(username).cloned()
    }
}
