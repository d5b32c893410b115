//! Bidirectional byte relays.
//!
//! Two strategies, chosen by the caller from the connection types:
//! - [`relay_half_close`] for two TCP streams. Each direction shuts down its
//!   write side when its source reaches EOF, and both directions are awaited.
//! - [`relay_until_closed`] for everything else. The first direction to
//!   finish ends the relay and both streams are dropped.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

/// Byte counts per direction: (client → target, target → client).
pub type RelayOutcome = (io::Result<u64>, io::Result<u64>);

/// Relay between two TCP streams, preserving half-close.
pub async fn relay_half_close(client: TcpStream, target: TcpStream) -> RelayOutcome {
    let (client_read, client_write) = client.into_split();
    let (target_read, target_write) = target.into_split();

    let upstream = tokio::spawn(copy_and_close(client_read, target_write));
    let downstream = tokio::spawn(copy_and_close(target_read, client_write));

    let (upstream, downstream) = tokio::join!(upstream, downstream);
    (flatten(upstream), flatten(downstream))
}

async fn copy_and_close(mut from: OwnedReadHalf, mut to: OwnedWriteHalf) -> io::Result<u64> {
    let copied = tokio::io::copy(&mut from, &mut to).await;
    // Propagate EOF to the peer even if the copy failed.
    if let Err(e) = to.shutdown().await {
        if !is_closed(e.kind()) {
            tracing::debug!(error = %e, "Half-close failed");
        }
    }
    copied
}

fn flatten(joined: Result<io::Result<u64>, tokio::task::JoinError>) -> io::Result<u64> {
    joined.unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)))
}

/// Relay between two full-duplex streams until either direction finishes.
///
/// Returns the first direction's error, unless it only reports that a
/// connection was already closed.
pub async fn relay_until_closed<A, B>(a: A, b: B) -> io::Result<()>
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let mut directions = JoinSet::new();
    directions.spawn(async move { tokio::io::copy(&mut a_read, &mut b_write).await });
    directions.spawn(async move { tokio::io::copy(&mut b_read, &mut a_write).await });

    let first = directions.join_next().await;
    directions.abort_all();
    while directions.join_next().await.is_some() {}

    match first {
        Some(Ok(Ok(_))) | None => Ok(()),
        Some(Ok(Err(e))) if is_closed(e.kind()) => Ok(()),
        Some(Ok(Err(e))) => Err(e),
        Some(Err(e)) => Err(io::Error::new(io::ErrorKind::Other, e)),
    }
}

/// Errors meaning the peer is gone rather than that something broke.
pub fn is_closed(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}
