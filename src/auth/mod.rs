//! Authorization pipeline shared by the tunnel and forward paths.
//!
//! # Data Flow
//! ```text
//! request target + headers
//!     → target_address (host:port, default port by scheme)
//!     → CredentialsValidator (only when configured)
//!     → DialerSelector, or the default dialer
//!     → Authorization { dialer, address }
//! ```
//!
//! # Design Decisions
//! - No network I/O happens here. Callers dial only after `resolve` returns.
//! - Missing or malformed credentials are not an error by themselves; they
//!   validate as an empty username and password.

pub mod basic;
pub mod credentials;

use std::sync::Arc;

use axum::http::{HeaderMap, Uri};

use crate::dialer::{ContextDialer, DialerSelector};
use crate::error::{ProxyError, Result};

pub use basic::{basic_credentials, set_basic_auth, Credentials};
pub use credentials::{CredentialsValidator, StaticCredentials};

/// Network passed to selectors and dialers.
pub const NETWORK_TCP: &str = "tcp";

/// Who the request was authorized as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No validator is configured.
    Anonymous,
    User(String),
}

impl Identity {
    pub fn username(&self) -> &str {
        match self {
            Identity::Anonymous => "",
            Identity::User(name) => name,
        }
    }
}

/// Successful outcome of [`Authorizer::resolve`].
#[derive(Clone)]
pub struct Authorization {
    pub dialer: Arc<dyn ContextDialer>,
    pub address: String,
    pub identity: Identity,
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorization")
            .field("address", &self.address)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Validator, selector and default dialer used to authorize requests.
#[derive(Clone)]
pub struct Authorizer {
    validator: Option<Arc<dyn CredentialsValidator>>,
    selector: Option<Arc<dyn DialerSelector>>,
    default_dialer: Arc<dyn ContextDialer>,
}

impl Authorizer {
    pub fn new(default_dialer: Arc<dyn ContextDialer>) -> Self {
        Self {
            validator: None,
            selector: None,
            default_dialer,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn CredentialsValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn DialerSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Authorize a request for `uri` and pick its dialer.
    pub fn resolve(&self, uri: &Uri, headers: &HeaderMap) -> Result<Authorization> {
        let address = target_address(uri)?;

        let identity = match &self.validator {
            Some(validator) => {
                let credentials = basic_credentials(headers).unwrap_or_default();
                if !validator.validate_credentials(
                    &credentials.username,
                    &credentials.password,
                    &address,
                ) {
                    tracing::debug!(
                        address = %address,
                        username = %credentials.username,
                        "Credentials rejected"
                    );
                    return Err(ProxyError::Unauthorized);
                }
                Identity::User(credentials.username)
            }
            None => Identity::Anonymous,
        };

        let dialer = match &self.selector {
            Some(selector) => selector
                .select_dialer(identity.username(), NETWORK_TCP, &address)
                .map_err(ProxyError::from_selection)?,
            None => Arc::clone(&self.default_dialer),
        };

        Ok(Authorization {
            dialer,
            address,
            identity,
        })
    }
}

/// Compute `host:port` for a request target.
///
/// Ports default by scheme: http/ws to 80, https/wss to 443. A target without
/// a scheme (CONNECT authority form) defaults to 443.
pub fn target_address(uri: &Uri) -> Result<String> {
    let host = uri
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProxyError::InvalidTarget(uri.to_string()))?;

    let port = match uri.port_u16() {
        Some(port) => port,
        None => match uri.scheme_str() {
            Some(s) if s.eq_ignore_ascii_case("http") || s.eq_ignore_ascii_case("ws") => 80,
            Some(s) if s.eq_ignore_ascii_case("https") || s.eq_ignore_ascii_case("wss") => 443,
            None => 443,
            Some(other) => {
                return Err(ProxyError::InvalidTarget(format!(
                    "unsupported scheme {:?}",
                    other
                )))
            }
        },
    };

    Ok(format!("{}:{}", host, port))
}
