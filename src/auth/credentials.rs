//! Credential validation.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use subtle::ConstantTimeEq;

/// Accepts or rejects a (username, password, destination) triple.
pub trait CredentialsValidator: Send + Sync {
    fn validate_credentials(&self, username: &str, password: &str, address: &str) -> bool;
}

/// Fixed username/password table.
///
/// The table can be replaced while the proxy is running; requests in flight
/// keep validating against the snapshot they loaded.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    users: ArcSwap<HashMap<String, String>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users<I, U, P>(users: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        let credentials = Self::new();
        credentials.replace_users(users);
        credentials
    }

    /// Atomically swap the whole table.
    pub fn replace_users<I, U, P>(&self, users: I)
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        let table: HashMap<String, String> = users
            .into_iter()
            .map(|(u, p)| (u.into(), p.into()))
            .collect();
        self.users.store(Arc::new(table));
    }

    pub fn len(&self) -> usize {
        self.users.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.load().is_empty()
    }
}

impl CredentialsValidator for StaticCredentials {
    fn validate_credentials(&self, username: &str, password: &str, _address: &str) -> bool {
        if username.is_empty() {
            return false;
        }
        let users = self.users.load();
        match users.get(username) {
            Some(expected) => expected.as_bytes().ct_eq(password.as_bytes()).into(),
            None => false,
        }
    }
}
