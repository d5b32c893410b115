//! Error types for the proxy paths.
//!
//! Everything that can fail before response headers are written maps to a
//! status code through [`ProxyError::status_code`]. Failures after that point
//! are only logged.

use axum::http::StatusCode;
use thiserror::Error;

/// Boxed error returned by pluggable capabilities.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while authorizing, dialing or relaying a proxied request.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The inbound connection cannot be taken over for raw I/O.
    #[error("connection does not support hijacking")]
    HijackUnsupported,

    /// Credentials were rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// The dialer selector failed. Displays the selector's own message.
    #[error(transparent)]
    DialerSelection(BoxError),

    /// The transport maker could not build a transport for a dialer.
    #[error("{0}")]
    TransportConstruction(String),

    /// The request target has no usable host or scheme.
    #[error("invalid proxy target: {0}")]
    InvalidTarget(String),

    #[error("dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("round trip failed: {0}")]
    RoundTrip(#[source] BoxError),

    #[error("upgrade failed: {0}")]
    Upgrade(#[source] hyper::Error),

    #[error("relay: {0}")]
    Relay(#[from] std::io::Error),
}

impl ProxyError {
    /// Status code used when the error is rendered before headers are sent.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::RoundTrip(_) | ProxyError::Upgrade(_) => StatusCode::BAD_GATEWAY,
            ProxyError::HijackUnsupported
            | ProxyError::DialerSelection(_)
            | ProxyError::TransportConstruction(_)
            | ProxyError::Dial { .. }
            | ProxyError::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map an error returned by a [`DialerSelector`](crate::dialer::DialerSelector).
    ///
    /// A boxed [`ProxyError::Unauthorized`] keeps its meaning; anything else is
    /// a selection failure.
    pub fn from_selection(err: BoxError) -> Self {
        match err.downcast::<ProxyError>() {
            Ok(inner) => match *inner {
                ProxyError::Unauthorized => ProxyError::Unauthorized,
                other => ProxyError::DialerSelection(Box::new(other)),
            },
            Err(err) => ProxyError::DialerSelection(err),
        }
    }
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
