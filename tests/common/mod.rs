//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use forward_proxy::dialer::{ContextDialer, ProxyConn, TcpDialer};
use forward_proxy::{HttpServer, ProxyConfig, ProxyServer, Shutdown};

/// Serve `proxy` on an ephemeral port.
///
/// The server stops when the returned [`Shutdown`] is triggered or dropped.
pub async fn start_proxy(proxy: ProxyServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ProxyConfig::default();
    config.timeouts.shutdown_secs = 1;

    let shutdown = Shutdown::new();
    let server = HttpServer::with_proxy(config, Arc::new(proxy));
    tokio::spawn(server.run(listener, shutdown.subscribe()));
    (addr, shutdown)
}

/// reqwest client sending every `http://` request through the proxy.
pub fn proxied_client(proxy: SocketAddr, credentials: Option<(&str, &str)>) -> reqwest::Client {
    let mut proxy = reqwest::Proxy::http(format!("http://{}", proxy)).unwrap();
    if let Some((user, pass)) = credentials {
        proxy = proxy.basic_auth(user, pass);
    }
    reqwest::Client::builder().proxy(proxy).build().unwrap()
}

/// Read an HTTP head (through the blank line) one byte at a time so nothing
/// after it is consumed.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_eq!(n, 1, "connection closed inside head: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Backend answering every request with `body`. Each request head it
/// receives is sent on the returned channel.
pub async fn start_mock_backend(body: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (heads_tx, heads_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let heads_tx = heads_tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = heads_tx.send(head);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, heads_rx)
}

/// Backend answering with a chunked body. Each string sent on the returned
/// channel is written as one chunk; closing the channel ends the body.
pub async fn start_chunked_backend(
    content_type: &'static str,
) -> (SocketAddr, mpsc::UnboundedSender<&'static str>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (chunks_tx, mut chunks_rx) = mpsc::unbounded_channel::<&'static str>();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_head(&mut socket).await;
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\n\r\n",
            content_type
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        while let Some(chunk) = chunks_rx.recv().await {
            let frame = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
            socket.write_all(frame.as_bytes()).await.unwrap();
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
        let _ = socket.shutdown().await;
    });

    (addr, chunks_tx)
}

/// TCP server echoing whatever it reads.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut read, mut write) = socket.into_split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
                let _ = write.shutdown().await;
            });
        }
    });

    addr
}

/// WebSocket server echoing every message. Received text messages are also
/// reported on the returned channel.
pub async fn start_ws_echo_server() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_close() {
                        break;
                    }
                    if let Ok(text) = message.to_text() {
                        let _ = seen_tx.send(text.to_string());
                    }
                    if ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (addr, seen_rx)
}

/// Dialer counting how often it was asked to connect.
#[derive(Default)]
pub struct CountingDialer {
    inner: TcpDialer,
    dials: AtomicUsize,
}

impl CountingDialer {
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextDialer for CountingDialer {
    async fn dial(&self, network: &str, address: &str) -> io::Result<ProxyConn> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.inner.dial(network, address).await
    }
}

/// Address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
