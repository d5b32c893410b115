//! Dialer selection per authenticated identity.

use std::collections::HashMap;
use std::sync::Arc;

use super::ContextDialer;
use crate::error::{BoxError, ProxyError};

/// Chooses the dialer for a proxied request.
pub trait DialerSelector: Send + Sync {
    /// Return the dialer to use for `address`.
    ///
    /// `username` is empty when no authorization took place (anonymous use).
    /// Returning a boxed [`ProxyError::Unauthorized`] rejects the request with
    /// 401; any other error is rendered as a 500 with the error's message.
    fn select_dialer(
        &self,
        username: &str,
        network: &str,
        address: &str,
    ) -> Result<Arc<dyn ContextDialer>, BoxError>;
}

/// Table of per-user dialers with an optional fallback.
#[derive(Default)]
pub struct StaticDialerSelector {
    by_user: HashMap<String, Arc<dyn ContextDialer>>,
    fallback: Option<Arc<dyn ContextDialer>>,
}

impl StaticDialerSelector {
    /// Users without an entry get `fallback`, or are rejected if it is `None`.
    pub fn new(fallback: Option<Arc<dyn ContextDialer>>) -> Self {
        Self {
            by_user: HashMap::new(),
            fallback,
        }
    }

    pub fn insert(&mut self, username: impl Into<String>, dialer: Arc<dyn ContextDialer>) {
        self.by_user.insert(username.into(), dialer);
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

impl DialerSelector for StaticDialerSelector {
    fn select_dialer(
        &self,
        username: &str,
        _network: &str,
        _address: &str,
    ) -> Result<Arc<dyn ContextDialer>, BoxError> {
        self.by_user
            .get(username)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| Box::new(ProxyError::Unauthorized) as BoxError)
    }
}
