//! End-to-end tunnel tests over a real WebSocket

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use wsgate::metrics::Metrics;
use wsgate::protocol::{AddressType, HandshakeRequest, Identity};
use wsgate::{Config, GatewayServer};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq)]
enum Event {
    Data(Vec<u8>),
    Closed,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.server.bind_addr = "127.0.0.1:0".parse().unwrap();
    config
}

async fn start_gateway(config: Config, metrics: Arc<Metrics>) -> SocketAddr {
    let server = GatewayServer::bind(&config, metrics).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve(std::future::pending::<()>()));
    addr
}

async fn connect(gateway: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/vl", gateway)).await.unwrap();
    ws
}

fn handshake(identity: &Identity, target: SocketAddr, payload: &[u8]) -> Vec<u8> {
    HandshakeRequest {
        version: 0,
        identity: *identity.as_bytes(),
        target_port: target.port(),
        address_type: AddressType::Ipv4,
        target_host: target.ip().to_string(),
        remainder: Bytes::copy_from_slice(payload),
    }
    .encode(&[])
    .unwrap()
}

fn default_identity() -> Identity {
    Config::default().identity().unwrap()
}

async fn next_event(ws: &mut Client) -> Event {
    loop {
        match timeout(WAIT, ws.next()).await.expect("timed out waiting for websocket") {
            Some(Ok(Message::Binary(data))) => return Event::Data(data),
            Some(Ok(Message::Text(text))) => return Event::Data(text.into_bytes()),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Event::Closed,
        }
    }
}

/// Collect relayed bytes until `len` bytes arrived; the relay may re-chunk data
async fn read_data(ws: &mut Client, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < len {
        match next_event(ws).await {
            Event::Data(data) => out.extend_from_slice(&data),
            Event::Closed => panic!("socket closed after {} of {} bytes", out.len(), len),
        }
    }
    out
}

/// Poll `condition` until it holds or the test deadline passes
async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn spawn_echo_target() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_ack_then_bidirectional_echo() {
    let target = spawn_echo_target().await;
    let gateway = start_gateway(test_config(), Arc::new(Metrics::new())).await;
    let mut ws = connect(gateway).await;

    ws.send(Message::Binary(handshake(&default_identity(), target, b"hello")))
        .await
        .unwrap();

    assert_eq!(next_event(&mut ws).await, Event::Data(vec![0, 0]));
    assert_eq!(read_data(&mut ws, 5).await, b"hello");

    ws.send(Message::Binary(b"world".to_vec())).await.unwrap();
    assert_eq!(read_data(&mut ws, 5).await, b"world");

    let large: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    ws.send(Message::Binary(large.clone())).await.unwrap();
    assert_eq!(read_data(&mut ws, large.len()).await, large);
}

#[tokio::test]
async fn test_ack_echoes_version() {
    let target = spawn_echo_target().await;
    let gateway = start_gateway(test_config(), Arc::new(Metrics::new())).await;
    let mut ws = connect(gateway).await;

    let mut message = handshake(&default_identity(), target, b"");
    message[0] = 0x2A;
    ws.send(Message::Binary(message)).await.unwrap();

    assert_eq!(next_event(&mut ws).await, Event::Data(vec![0x2A, 0]));
}

#[tokio::test]
async fn test_remainder_is_first_on_outbound() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut seen = Vec::new();
        let _ = stream.read_to_end(&mut seen).await;
        let _ = seen_tx.send(seen);
    });

    let gateway = start_gateway(test_config(), Arc::new(Metrics::new())).await;
    let mut ws = connect(gateway).await;

    ws.send(Message::Binary(handshake(&default_identity(), target, b"first|")))
        .await
        .unwrap();
    assert_eq!(next_event(&mut ws).await, Event::Data(vec![0, 0]));

    ws.send(Message::Binary(b"second".to_vec())).await.unwrap();
    ws.close(None).await.unwrap();

    let seen = timeout(WAIT, seen_rx).await.unwrap().unwrap();
    assert_eq!(seen, b"first|second");
}

#[tokio::test]
async fn test_wrong_identity_is_dropped_without_ack() {
    let target = spawn_echo_target().await;
    let metrics = Arc::new(Metrics::new());
    let gateway = start_gateway(test_config(), metrics.clone()).await;
    let mut ws = connect(gateway).await;

    let stranger = Identity::from_bytes([0x11; 16]);
    ws.send(Message::Binary(handshake(&stranger, target, b"hello")))
        .await
        .unwrap();

    assert_eq!(next_event(&mut ws).await, Event::Closed);
    assert_eq!(metrics.get_handshake_rejections("auth_failed"), 1);
}

#[tokio::test]
async fn test_short_handshake_is_dropped_without_ack() {
    let gateway = start_gateway(test_config(), Arc::new(Metrics::new())).await;
    let mut ws = connect(gateway).await;

    ws.send(Message::Binary(vec![0u8; 10])).await.unwrap();

    assert_eq!(next_event(&mut ws).await, Event::Closed);
}

#[tokio::test]
async fn test_unknown_address_type_is_dropped_without_ack() {
    let target = spawn_echo_target().await;
    let gateway = start_gateway(test_config(), Arc::new(Metrics::new())).await;
    let mut ws = connect(gateway).await;

    let mut message = handshake(&default_identity(), target, b"");
    message[21] = 4;
    ws.send(Message::Binary(message)).await.unwrap();

    assert_eq!(next_event(&mut ws).await, Event::Closed);
}

#[tokio::test]
async fn test_handshake_timeout_closes_socket() {
    let mut config = test_config();
    config.server.handshake_timeout = Duration::from_millis(200);
    let metrics = Arc::new(Metrics::new());
    let gateway = start_gateway(config, metrics.clone()).await;
    let mut ws = connect(gateway).await;

    assert_eq!(next_event(&mut ws).await, Event::Closed);
    assert_eq!(metrics.get_handshake_rejections("timeout"), 1);
}

#[tokio::test]
async fn test_unreachable_target_ends_after_ack() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    drop(listener);

    let metrics = Arc::new(Metrics::new());
    let gateway = start_gateway(test_config(), metrics.clone()).await;
    let mut ws = connect(gateway).await;

    ws.send(Message::Binary(handshake(&default_identity(), target, b"")))
        .await
        .unwrap();

    assert_eq!(next_event(&mut ws).await, Event::Data(vec![0, 0]));
    assert_eq!(next_event(&mut ws).await, Event::Closed);
    assert_eq!(metrics.get_outbound_connect_failures(), 1);
}

#[tokio::test]
async fn test_target_close_closes_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"bye").await.unwrap();
        // dropping the stream closes the outbound leg
    });

    let gateway = start_gateway(test_config(), Arc::new(Metrics::new())).await;
    let mut ws = connect(gateway).await;

    ws.send(Message::Binary(handshake(&default_identity(), target, b"")))
        .await
        .unwrap();

    assert_eq!(next_event(&mut ws).await, Event::Data(vec![0, 0]));
    assert_eq!(read_data(&mut ws, 3).await, b"bye");
    assert_eq!(next_event(&mut ws).await, Event::Closed);
}

#[tokio::test]
async fn test_client_close_closes_target() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    let (eof_tx, eof_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        let _ = eof_tx.send(());
    });

    let metrics = Arc::new(Metrics::new());
    let gateway = start_gateway(test_config(), metrics.clone()).await;
    let mut ws = connect(gateway).await;

    ws.send(Message::Binary(handshake(&default_identity(), target, b"x")))
        .await
        .unwrap();
    assert_eq!(next_event(&mut ws).await, Event::Data(vec![0, 0]));

    drop(ws);

    assert!(timeout(WAIT, eof_rx).await.is_ok(), "target never saw EOF");
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let target = spawn_echo_target().await;
    let gateway = start_gateway(test_config(), Arc::new(Metrics::new())).await;

    let mut handles = Vec::new();
    for i in 0..5u8 {
        handles.push(tokio::spawn(async move {
            let mut ws = connect(gateway).await;
            let payload = vec![i; 32];
            ws.send(Message::Binary(handshake(&default_identity(), target, &payload)))
                .await
                .unwrap();
            assert_eq!(next_event(&mut ws).await, Event::Data(vec![0, 0]));
            assert_eq!(read_data(&mut ws, 32).await, payload);
        }));
    }

    // One bad client must not disturb the others
    let mut bad = connect(gateway).await;
    bad.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    assert_eq!(next_event(&mut bad).await, Event::Closed);

    for handle in handles {
        timeout(WAIT, handle).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_text_first_message_is_dropped_without_ack() {
    let metrics = Arc::new(Metrics::new());
    let gateway = start_gateway(test_config(), metrics.clone()).await;
    let mut ws = connect(gateway).await;

    ws.send(Message::Text("hello".to_string())).await.unwrap();

    assert_eq!(next_event(&mut ws).await, Event::Closed);
    wait_until(|| metrics.get_handshake_rejections("malformed") == 1).await;
}

#[tokio::test]
async fn test_close_before_handshake_is_dropped_without_ack() {
    let metrics = Arc::new(Metrics::new());
    let gateway = start_gateway(test_config(), metrics.clone()).await;
    let mut ws = connect(gateway).await;

    ws.send(Message::Close(None)).await.unwrap();

    assert_eq!(next_event(&mut ws).await, Event::Closed);
    wait_until(|| metrics.get_handshake_rejections("malformed") == 1).await;
}

#[tokio::test]
async fn test_shutdown_during_relay_releases_session() {
    let target = spawn_echo_target().await;
    let metrics = Arc::new(Metrics::new());
    let server = GatewayServer::bind(&test_config(), metrics.clone()).await.unwrap();
    let gateway = server.local_addr().unwrap();
    let connections = server.connections();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    let mut ws = connect(gateway).await;
    ws.send(Message::Binary(handshake(&default_identity(), target, b"live")))
        .await
        .unwrap();
    assert_eq!(next_event(&mut ws).await, Event::Data(vec![0, 0]));
    assert_eq!(read_data(&mut ws, 4).await, b"live");

    assert_eq!(connections.get_active_connections(), 1);
    assert_eq!(connections.get_connection_stats().active_sessions, 1);
    assert_eq!(metrics.get_active_sessions(), 1);

    stop_tx.send(()).unwrap();
    assert_eq!(next_event(&mut ws).await, Event::Closed);

    wait_until(|| connections.get_active_connections() == 0).await;
    assert_eq!(connections.get_connection_stats().active_sessions, 0);
    assert_eq!(metrics.get_active_sessions(), 0);
}
