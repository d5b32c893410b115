//! Outbound connection capabilities.
//!
//! # Data Flow
//! ```text
//! authorization pipeline
//!     → selector.rs (username + target → dialer)
//!     → ContextDialer::dial (tcp.rs by default)
//!     → ProxyConn (tunnel relay, or wrapped by a transport connector)
//! ```
//!
//! # Design Decisions
//! - Dialers are shared as `Arc<dyn ContextDialer>`. The transport cache keys on
//!   the pointer identity of that `Arc`, so selectors hand out one `Arc` per
//!   logical dialer to get pooled connection reuse.
//! - Whether a connection can be half-closed is a property of the value
//!   ([`ProxyConn::supports_half_close`]), not of a type hierarchy.

pub mod selector;
pub mod tcp;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

pub use selector::{DialerSelector, StaticDialerSelector};
pub use tcp::TcpDialer;

/// Opens connections to proxy targets.
#[async_trait]
pub trait ContextDialer: Send + Sync {
    /// Connect to `address` (`host:port`) over `network`.
    ///
    /// The returned future is owned by the request handler; dropping it (for
    /// example when the client goes away) cancels the dial.
    async fn dial(&self, network: &str, address: &str) -> io::Result<ProxyConn>;
}

/// Any full-duplex byte stream.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A connection on either side of a tunnel.
pub enum ProxyConn {
    /// Plain TCP. The read and write halves can be shut down independently.
    Tcp(TcpStream),
    /// Any other stream (TLS, upgraded HTTP, in-memory pipes). Closing it
    /// closes both directions.
    Duplex(Box<dyn DuplexStream>),
}

impl ProxyConn {
    pub fn duplex<S: DuplexStream + 'static>(stream: S) -> Self {
        ProxyConn::Duplex(Box::new(stream))
    }

    pub fn supports_half_close(&self) -> bool {
        matches!(self, ProxyConn::Tcp(_))
    }
}

impl From<TcpStream> for ProxyConn {
    fn from(stream: TcpStream) -> Self {
        ProxyConn::Tcp(stream)
    }
}

impl std::fmt::Debug for ProxyConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyConn::Tcp(stream) => f.debug_tuple("Tcp").field(stream).finish(),
            ProxyConn::Duplex(_) => f.write_str("Duplex(..)"),
        }
    }
}

impl AsyncRead for ProxyConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ProxyConn::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            ProxyConn::Duplex(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ProxyConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ProxyConn::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            ProxyConn::Duplex(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ProxyConn::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            ProxyConn::Duplex(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ProxyConn::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            ProxyConn::Duplex(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
