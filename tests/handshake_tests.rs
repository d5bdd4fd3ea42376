//! End-to-end handshake tests for the negotiation layer.
//!
//! These drive full wire exchanges over in-memory streams: the inbound
//! acceptor against scripted clients, and the outbound connectors against
//! scripted upstream proxies, including the equivalence of the blocking
//! and callback-driven negotiation forms.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tunnelgate::common::auth::BasicAuthenticator;
use tunnelgate::common::{BufferPool, NegotiationSession};
use tunnelgate::config::SocksAcceptorConfig;
use tunnelgate::inbound::SocksAcceptor;
use tunnelgate::outbound::HttpsConnector;
use tunnelgate::{Error, Result};

fn peer() -> SocketAddr {
    "127.0.0.1:51234".parse().unwrap()
}

struct FixedCredentials;

#[async_trait]
impl BasicAuthenticator for FixedCredentials {
    async fn authenticate(
        &self,
        _session: &NegotiationSession,
        username: &str,
        password: &str,
    ) -> bool {
        username == "alice" && password == "wonder"
    }
}

/// Read an upstream-side CONNECT request to its blank line, then answer
/// with the canned response and close.
async fn upstream_script(mut server: DuplexStream, response: &'static [u8]) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = [0u8; 256];
    while !received.ends_with(b"\r\n\r\n") {
        let n = server.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before finishing the request");
        received.extend_from_slice(&buf[..n]);
    }
    server.write_all(response).await.unwrap();
    received
}

async fn negotiate_blocking(response: &'static [u8]) -> (Vec<u8>, Result<()>) {
    let (mut client, server) = duplex(4096);
    let server_task = tokio::spawn(upstream_script(server, response));

    let connector = HttpsConnector::new();
    let outcome = connector.negotiate(&mut client, "example.com", 443).await;
    drop(client);

    (server_task.await.unwrap(), outcome)
}

async fn negotiate_callback(response: &'static [u8]) -> (Vec<u8>, Result<()>) {
    let (client, server) = duplex(4096);
    let server_task = tokio::spawn(upstream_script(server, response));

    let connector = HttpsConnector::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    connector.begin_negotiate(client, "example.com".to_string(), 443, move |outcome| {
        let _ = tx.send(outcome.map(|_stream| ()));
    });
    let outcome = rx.await.unwrap();

    (server_task.await.unwrap(), outcome)
}

#[tokio::test]
async fn socks5_full_handshake_with_credentials() {
    let pool = Arc::new(BufferPool::new(4096));
    let acceptor = SocksAcceptor::new(&SocksAcceptorConfig::default(), pool.clone())
        .with_basic_authenticator(Arc::new(FixedCredentials));

    let (mut client, server) = duplex(4096);
    let handle = tokio::spawn(async move {
        let mut server = server;
        acceptor.accept(&[5, 1, 2], &mut server, peer()).await
    });

    let mut method = [0u8; 2];
    client.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [5, 2]);

    let mut record = vec![1u8, 5];
    record.extend_from_slice(b"alice");
    record.push(6);
    record.extend_from_slice(b"wonder");
    client.write_all(&record).await.unwrap();

    let mut status = [0u8; 2];
    client.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [1, 0]);

    let mut request = vec![5u8, 1, 0, 3, 12];
    request.extend_from_slice(b"internal.api");
    request.extend_from_slice(&8080u16.to_be_bytes());
    client.write_all(&request).await.unwrap();

    let mut reply = vec![0u8; request.len()];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0);

    let target = handle.await.unwrap().unwrap();
    assert_eq!(target.host, "internal.api");
    assert_eq!(target.port, 8080);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn connect_success_leaves_stream_at_tunnel_bytes() {
    let (mut client, server) = duplex(4096);
    let server_task = tokio::spawn(async move {
        let mut server = server;
        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        while !received.ends_with(b"\r\n\r\n") {
            let n = server.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        server
            .write_all(b"HTTP/1.1 200 Connection established\r\nVia: 1.1 proxy\r\n\r\n")
            .await
            .unwrap();
        server.write_all(b"tunnel-bytes").await.unwrap();
        received
    });

    let connector = HttpsConnector::new();
    connector
        .negotiate(&mut client, "example.com", 443)
        .await
        .unwrap();

    let mut payload = [0u8; 12];
    client.read_exact(&mut payload).await.unwrap();
    assert_eq!(&payload, b"tunnel-bytes");

    let request = server_task.await.unwrap();
    assert!(request.starts_with(b"CONNECT example.com:443 HTTP/1.1\r\n"));
}

#[tokio::test]
async fn blocking_and_callback_forms_are_equivalent() {
    let cases: [&'static [u8]; 3] = [
        b"HTTP/1.1 200 Connection established\r\nVia: 1.1 proxy\r\n\r\n",
        b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n",
        b"HTTP/2.0 200 Connection established\r\n\r\n",
    ];

    for response in cases {
        let (sent_blocking, outcome_blocking) = negotiate_blocking(response).await;
        let (sent_callback, outcome_callback) = negotiate_callback(response).await;

        assert_eq!(sent_blocking, sent_callback);
        match (outcome_blocking, outcome_callback) {
            (Ok(()), Ok(())) => {}
            (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
            (a, b) => panic!("diverging outcomes: {:?} vs {:?}", a, b),
        }
    }
}

#[tokio::test]
async fn rejected_connect_carries_status_code() {
    let (_, outcome) =
        negotiate_blocking(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;
    match outcome {
        Err(Error::Rejected(msg)) => assert!(msg.contains("407")),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn callback_fires_exactly_once() {
    let invocations = Arc::new(AtomicUsize::new(0));

    for response in [
        &b"HTTP/1.1 200 OK\r\n\r\n"[..],
        &b"not an http response at all\r\n\r\n"[..],
    ] {
        let (client, server) = duplex(4096);
        tokio::spawn(upstream_script(server, response));

        let connector = HttpsConnector::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let counter = invocations.clone();
        connector.begin_negotiate(client, "example.com".to_string(), 443, move |outcome| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(outcome.map(|_stream| ()));
        });
        rx.await.unwrap().ok();
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn callback_reports_input_validation_without_io() {
    let (client, _server) = duplex(64);
    let connector = HttpsConnector::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    connector.begin_negotiate(client, String::new(), 443, move |outcome| {
        let _ = tx.send(outcome.map(|_stream| ()));
    });
    assert!(matches!(rx.await.unwrap(), Err(Error::Address(_))));
}
