//! CONNECT tunnels through a running proxy.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use forward_proxy::auth::{set_basic_auth, StaticCredentials};
use forward_proxy::dialer::{ContextDialer, DialerSelector, ProxyConn};
use forward_proxy::error::BoxError;
use forward_proxy::ProxyServer;

mod common;

const ESTABLISHED: &str = "HTTP/1.0 200 Connection established\r\n\r\n";

async fn connect(proxy: std::net::SocketAddr, target: &str, extra: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!(
        "CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n{extra}\r\n",
        target = target,
        extra = extra
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let head = common::read_head(&mut stream).await;
    (stream, head)
}

fn authorization(user: &str, pass: &str) -> String {
    let mut headers = HeaderMap::new();
    set_basic_auth(&mut headers, user, pass);
    let value = headers.values().next().unwrap().to_str().unwrap();
    format!("Proxy-Authorization: {}\r\n", value)
}

/// Reads until the proxy closes the connection.
async fn assert_closed(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("connection stayed open after a failed CONNECT")
        .unwrap();
    assert!(rest.is_empty(), "{:?}", rest);
}

struct FailSelectDialer;

impl DialerSelector for FailSelectDialer {
    fn select_dialer(
        &self,
        _username: &str,
        _network: &str,
        _address: &str,
    ) -> Result<Arc<dyn ContextDialer>, BoxError> {
        Err("failSelectDialer".into())
    }
}

/// Dialer handing out in-memory pipes served by an echo task.
struct PipeDialer;

#[async_trait]
impl ContextDialer for PipeDialer {
    async fn dial(&self, _network: &str, _address: &str) -> io::Result<ProxyConn> {
        let (near, far) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let (mut read, mut write) = tokio::io::split(far);
            let _ = tokio::io::copy(&mut read, &mut write).await;
        });
        Ok(ProxyConn::duplex(near))
    }
}

#[tokio::test]
async fn test_tunnel_relays_both_ways() {
    let echo = common::start_echo_server().await;
    let (proxy, _shutdown) = common::start_proxy(ProxyServer::builder().build()).await;

    let (mut stream, head) = connect(proxy, &echo.to_string(), "").await;
    assert_eq!(head, ESTABLISHED);

    for message in [&b"hello"[..], b"through the tunnel"] {
        stream.write_all(message).await.unwrap();
        let mut buf = vec![0u8; message.len()];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, message);
    }
}

#[tokio::test]
async fn test_tunnel_preserves_half_close() {
    // Replies only after the client finished sending.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();
        let reply = format!("got {} bytes", received.len());
        socket.write_all(reply.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    let (proxy, _shutdown) = common::start_proxy(ProxyServer::builder().build()).await;
    let (mut stream, head) = connect(proxy, &target.to_string(), "").await;
    assert_eq!(head, ESTABLISHED);

    stream.write_all(b"0123456789").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut reply = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut reply))
        .await
        .expect("tunnel did not close after the target finished")
        .unwrap();
    assert_eq!(reply, "got 10 bytes");
}

#[tokio::test]
async fn test_tunnel_closes_when_target_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"bye").await.unwrap();
    });

    let (proxy, _shutdown) = common::start_proxy(ProxyServer::builder().build()).await;
    let (mut stream, _) = connect(proxy, &target.to_string(), "").await;

    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("tunnel stayed open")
        .unwrap();
    assert_eq!(rest, b"bye");
}

#[tokio::test]
async fn test_tunnel_unauthorized() {
    let echo = common::start_echo_server().await;
    let dialer = Arc::new(common::CountingDialer::default());
    let server = ProxyServer::builder()
        .credentials_validator(Arc::new(StaticCredentials::from_users([("user", "pass")])))
        .default_dialer(dialer.clone())
        .build();
    let (proxy, _shutdown) = common::start_proxy(server).await;

    let (mut stream, head) = connect(proxy, &echo.to_string(), "").await;
    assert_eq!(head, "HTTP/1.0 401 Unauthorized\r\n\r\n");
    assert_closed(&mut stream).await;

    let (_stream, head) = connect(proxy, &echo.to_string(), &authorization("user", "nope")).await;
    assert_eq!(head, "HTTP/1.0 401 Unauthorized\r\n\r\n");

    assert_eq!(dialer.dials(), 0);
}

#[tokio::test]
async fn test_tunnel_authorized() {
    let echo = common::start_echo_server().await;
    let server = ProxyServer::builder()
        .credentials_validator(Arc::new(StaticCredentials::from_users([("user", "pass")])))
        .build();
    let (proxy, _shutdown) = common::start_proxy(server).await;

    let (mut stream, head) = connect(proxy, &echo.to_string(), &authorization("user", "pass")).await;
    assert_eq!(head, ESTABLISHED);

    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_tunnel_dial_failure() {
    let target = common::closed_port().await;
    let (proxy, _shutdown) = common::start_proxy(ProxyServer::builder().build()).await;

    let (mut stream, head) = connect(proxy, &target.to_string(), "").await;
    assert_eq!(head, "HTTP/1.0 500 Internal Server Error\r\n\r\n");
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_tunnel_select_dialer_failure() {
    let echo = common::start_echo_server().await;
    let server = ProxyServer::builder()
        .dialer_selector(Arc::new(FailSelectDialer))
        .build();
    let (proxy, _shutdown) = common::start_proxy(server).await;

    let (mut stream, head) = connect(proxy, &echo.to_string(), "").await;
    assert_eq!(head, "HTTP/1.0 500 Internal Server Error\r\n\r\n");
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_tunnel_over_duplex_connection() {
    let server = ProxyServer::builder().default_dialer(Arc::new(PipeDialer)).build();
    let (proxy, _shutdown) = common::start_proxy(server).await;

    let (mut stream, head) = connect(proxy, "pipe.invalid:443", "").await;
    assert_eq!(head, ESTABLISHED);

    stream.write_all(b"full duplex").await.unwrap();
    let mut buf = [0u8; 11];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"full duplex");

    // Closing our side tears the whole tunnel down.
    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("full-duplex tunnel stayed open")
        .unwrap();
    assert!(rest.is_empty());
}
