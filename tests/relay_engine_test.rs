//! Tests for the relay engine

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wsgate::metrics::Metrics;
use wsgate::protocol::{AddressType, HandshakeRequest};
use wsgate::relay::RelayEngine;
use wsgate::TunnelError;

fn request(address_type: AddressType, host: &str, port: u16) -> HandshakeRequest {
    HandshakeRequest {
        version: 0,
        identity: [0u8; 16],
        target_port: port,
        address_type,
        target_host: host.to_string(),
        remainder: Bytes::new(),
    }
}

#[tokio::test]
async fn test_target_connection_establishment() {
    let relay_engine = RelayEngine::new(Arc::new(Metrics::new()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            if let Ok(n) = stream.read(&mut buf).await {
                let _ = stream.write_all(&buf[..n]).await;
            }
        }
    });

    let target = request(AddressType::Ipv4, "127.0.0.1", server_addr.port());
    let (mut stream, connected) = relay_engine.connect_to_target(&target).await.unwrap();
    assert_eq!(connected, server_addr);

    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_domain_target_resolves() {
    let relay_engine = RelayEngine::new(Arc::new(Metrics::new()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    // localhost may resolve to ::1 first; every resolved address is tried
    let target = request(AddressType::Domain, "localhost", port);
    let result = relay_engine.connect_to_target(&target).await;
    assert!(result.is_ok(), "localhost should resolve and connect: {:?}", result.err());
}

#[tokio::test]
async fn test_refused_connection_is_reported() {
    let relay_engine = RelayEngine::new(Arc::new(Metrics::new()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let target = request(AddressType::Ipv4, "127.0.0.1", port);
    match relay_engine.connect_to_target(&target).await {
        Err(TunnelError::OutboundConnectFailed { target, .. }) => {
            assert_eq!(target, format!("127.0.0.1:{}", port));
        }
        other => panic!("expected connect failure, got {:?}", other.map(|(_, addr)| addr)),
    }
}

#[tokio::test]
async fn test_connect_timeout() {
    // 192.0.2.0/24 is reserved for documentation and never answers
    let relay_engine = RelayEngine::with_settings(
        Some(Duration::from_millis(100)),
        16 * 1024,
        Arc::new(Metrics::new()),
    );

    let target = request(AddressType::Ipv4, "192.0.2.1", 9);
    let started = std::time::Instant::now();
    let result = relay_engine.connect_to_target(&target).await;

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_session_tracking() {
    let relay_engine = RelayEngine::new(Arc::new(Metrics::new()));

    assert_eq!(relay_engine.active_session_count(), 0);
    assert!(relay_engine.get_active_session_stats().is_empty());
}
