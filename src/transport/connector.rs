//! `hyper` connector that opens connections through a [`ContextDialer`].

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::Uri;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use tower::Service;

use crate::auth::{target_address, NETWORK_TCP};
use crate::dialer::{ContextDialer, ProxyConn};

/// Connector for `hyper_util`'s pooled client.
#[derive(Clone)]
pub struct DialerConnector {
    dialer: Arc<dyn ContextDialer>,
}

impl DialerConnector {
    pub fn new(dialer: Arc<dyn ContextDialer>) -> Self {
        Self { dialer }
    }
}

impl Service<Uri> for DialerConnector {
    type Response = DialedStream;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<DialedStream>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let dialer = Arc::clone(&self.dialer);
        Box::pin(async move {
            let address = target_address(&uri)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
            let conn = dialer.dial(NETWORK_TCP, &address).await?;
            tracing::trace!(address = %address, "Upstream connection dialed");
            Ok(DialedStream {
                io: TokioIo::new(conn),
            })
        })
    }
}

/// A dialed connection adapted to hyper's I/O traits.
pub struct DialedStream {
    io: TokioIo<ProxyConn>,
}

impl DialedStream {
    pub fn into_inner(self) -> ProxyConn {
        self.io.into_inner()
    }
}

impl Connection for DialedStream {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl Read for DialedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_read(cx, buf)
    }
}

impl Write for DialedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}
