//! Default TCP dialer.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpSocket, TcpStream};

use super::{ContextDialer, ProxyConn};

/// Timeout for upstream TCP connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Dials plain TCP, optionally from a fixed local source address.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
    local_address: Option<IpAddr>,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            local_address: None,
        }
    }

    /// Bind outgoing sockets to `address` before connecting.
    pub fn with_local_address(mut self, address: IpAddr) -> Self {
        self.local_address = Some(address);
        self
    }

    /// Whether `remote` is usable for `network` from this dialer's source
    /// address.
    fn accepts(&self, network: &str, remote: &SocketAddr) -> bool {
        let family = match network {
            "tcp4" => remote.is_ipv4(),
            "tcp6" => remote.is_ipv6(),
            _ => true,
        };
        family
            && self
                .local_address
                .map_or(true, |local| local.is_ipv4() == remote.is_ipv4())
    }

    async fn connect(&self, network: &str, address: &str) -> io::Result<TcpStream> {
        let mut last_err = None;
        for remote in tokio::net::lookup_host(address).await? {
            if !self.accepts(network, &remote) {
                continue;
            }
            let socket = if remote.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            if let Some(local) = self.local_address {
                socket.bind(SocketAddr::new(local, 0))?;
            }
            match socket.connect(remote).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!(remote = %remote, error = %e, "Connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {} address of {} is usable", network, address),
            )
        }))
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl ContextDialer for TcpDialer {
    async fn dial(&self, network: &str, address: &str) -> io::Result<ProxyConn> {
        if !matches!(network, "tcp" | "tcp4" | "tcp6") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported network {:?}", network),
            ));
        }

        let stream = match tokio::time::timeout(self.connect_timeout, self.connect(network, address)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", address),
                ))
            }
        };
        stream.set_nodelay(true)?;
        Ok(ProxyConn::Tcp(stream))
    }
}
