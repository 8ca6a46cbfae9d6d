//! End-to-end tests: a real relay on ephemeral ports driven by the SDK
//! clients.

use std::future::Future;
use std::time::Duration;

use cmdrelay_sdk::tcp::{RelayTcpClient, TcpConfig};
use cmdrelay_sdk::ws::RelayWsClient;
use cmdrelay_sdk::{Broadcast, BusinessMessage, FrameCodec, Protocol};
use cmdrelay_server::{RelayConfig, RelayServer, RunningServer};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn local_config() -> RelayConfig {
    RelayConfig::default()
        .with_host("127.0.0.1")
        .with_ports(0, 0)
        .with_flush_interval(20)
        .with_shutdown_timeout(2)
}

async fn start(config: RelayConfig) -> (RelayServer, RunningServer) {
    let server = RelayServer::new(config).expect("server");
    let running = server
        .start(CancellationToken::new())
        .await
        .expect("start");
    (server, running)
}

async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached");
}

/// Reads broadcasts until one contains `user_id`.
async fn broadcast_with<F, Fut, E>(mut next: F, user_id: &str) -> Broadcast
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Broadcast, E>>,
    E: std::fmt::Debug,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let broadcast = next().await.expect("broadcast");
            if broadcast.contains_key(user_id) {
                return broadcast;
            }
        }
    })
    .await
    .expect("broadcast in time")
}

async fn tcp_client(running: &RunningServer) -> RelayTcpClient {
    RelayTcpClient::connect(TcpConfig::new(running.socket_addr().to_string()))
        .await
        .expect("tcp connect")
}

async fn ws_client(running: &RunningServer) -> RelayWsClient {
    let client = RelayWsClient::with_url(format!("ws://{}/ws", running.websocket_addr()))
        .expect("ws client");
    client.connect().await.expect("ws connect");
    client
}

#[tokio::test]
async fn test_truncated_frame_is_discarded_and_next_is_processed() {
    let (server, running) = start(local_config()).await;
    let client = tcp_client(&running).await;
    let registry = server.registry(Protocol::Socket);
    eventually(|| registry.len() == 1).await;

    let truncated = FrameCodec::encode_frame(br#"{"userId":"u1""#).expect("frame");
    client.send_raw(&truncated).await.expect("send truncated");
    client
        .send(&BusinessMessage::new(Protocol::Socket, "u1").with_op_type("set"))
        .await
        .expect("send valid");

    let broadcast = broadcast_with(|| client.next_broadcast(), "u1").await;
    assert_eq!(broadcast["u1"].op_type, "set");

    let metrics = server.metrics();
    assert_eq!(metrics.parse_errors(), 1);
    assert_eq!(registry.len(), 1);

    running.stop().await;
}

#[tokio::test]
async fn test_websocket_publish_reaches_every_websocket_peer() {
    let (server, running) = start(local_config()).await;
    let publisher = ws_client(&running).await;
    let subscriber = ws_client(&running).await;
    let registry = server.registry(Protocol::Websocket);
    eventually(|| registry.len() == 2).await;

    publisher
        .send(&BusinessMessage::new(Protocol::Websocket, "u2").with_data(json!({"cmd": "reboot"})))
        .await
        .expect("publish");

    for client in [&publisher, &subscriber] {
        let broadcast = broadcast_with(|| client.next_broadcast(), "u2").await;
        assert_eq!(broadcast["u2"].data, json!({"cmd": "reboot"}));
    }

    running.stop().await;
}

#[tokio::test]
async fn test_closed_peer_does_not_block_delivery_to_others() {
    let (server, running) = start(local_config()).await;
    let leaving = tcp_client(&running).await;
    let staying = tcp_client(&running).await;
    let registry = server.registry(Protocol::Socket);
    eventually(|| registry.len() == 2).await;

    leaving.close().await.expect("close");
    drop(leaving);
    server
        .relay()
        .submit(BusinessMessage::new(Protocol::Socket, "u3"));

    let broadcast = broadcast_with(|| staying.next_broadcast(), "u3").await;
    assert!(broadcast.contains_key("u3"));
    eventually(|| registry.len() == 1).await;

    running.stop().await;
}

#[tokio::test]
async fn test_fan_out_is_isolated_by_protocol() {
    let (server, running) = start(local_config()).await;
    let tcp = tcp_client(&running).await;
    let ws = ws_client(&running).await;
    eventually(|| server.registry(Protocol::Socket).len() == 1).await;
    eventually(|| server.registry(Protocol::Websocket).len() == 1).await;

    ws.send(&BusinessMessage::new(Protocol::Websocket, "ws-only"))
        .await
        .expect("publish");
    broadcast_with(|| ws.next_broadcast(), "ws-only").await;

    let leaked = tokio::time::timeout(Duration::from_millis(200), tcp.next_payload()).await;
    assert!(leaked.is_err(), "socket peer received a websocket broadcast");

    running.stop().await;
}

#[tokio::test]
async fn test_message_protocol_selects_target_transport() {
    let (server, running) = start(local_config()).await;
    let tcp = tcp_client(&running).await;
    let ws = ws_client(&running).await;
    eventually(|| server.registry(Protocol::Socket).len() == 1).await;
    eventually(|| server.registry(Protocol::Websocket).len() == 1).await;

    tcp.send(&BusinessMessage::new(Protocol::Websocket, "bridged"))
        .await
        .expect("publish");

    let broadcast = broadcast_with(|| ws.next_broadcast(), "bridged").await;
    assert_eq!(broadcast["bridged"].protocol, Protocol::Websocket);

    running.stop().await;
}

#[tokio::test]
async fn test_coalescing_keeps_latest_per_user() {
    let (server, running) = start(local_config().with_flush_interval(300)).await;
    let client = tcp_client(&running).await;
    eventually(|| server.registry(Protocol::Socket).len() == 1).await;

    for version in 1..=3 {
        client
            .send(&BusinessMessage::new(Protocol::Socket, "u1").with_data(json!(version)))
            .await
            .expect("send");
    }
    eventually(|| server.metrics().messages_submitted() == 3).await;

    let broadcast = broadcast_with(|| client.next_broadcast(), "u1").await;
    assert_eq!(broadcast.len(), 1);
    assert_eq!(broadcast["u1"].data, json!(3));

    running.stop().await;
}

#[tokio::test]
async fn test_keepalive_keeps_responsive_peer_and_drops_silent_one() {
    let (server, running) = start(local_config().with_idle_timeout(1)).await;
    let responsive = tcp_client(&running).await;
    let mut silent = TcpStream::connect(running.socket_addr())
        .await
        .expect("connect");
    let registry = server.registry(Protocol::Socket);
    eventually(|| registry.len() == 2).await;

    // The silent peer sees one keepalive frame, then the server hangs up.
    let mut received = Vec::new();
    tokio::time::timeout(WAIT, silent.read_to_end(&mut received))
        .await
        .expect("server closed silent peer")
        .expect("read");
    assert_eq!(received, FrameCodec::encode_frame(b"").expect("frame").to_vec());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(registry.len(), 1);

    responsive
        .send(&BusinessMessage::new(Protocol::Socket, "alive"))
        .await
        .expect("send");
    broadcast_with(|| responsive.next_broadcast(), "alive").await;

    running.stop().await;
}

#[tokio::test]
async fn test_listen_only_peer_survives_while_receiving_broadcasts() {
    let (server, running) = start(local_config().with_idle_timeout(1)).await;
    let mut listener = TcpStream::connect(running.socket_addr())
        .await
        .expect("connect");
    let registry = server.registry(Protocol::Socket);
    eventually(|| registry.len() == 1).await;

    let relay = server.relay();
    let feeder = tokio::spawn(async move {
        for i in 0..25 {
            relay.submit(BusinessMessage::new(Protocol::Socket, format!("user-{i}")));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let mut received = 0usize;
    let mut buf = [0u8; 4096];
    let until = tokio::time::Instant::now() + Duration::from_millis(2500);
    while tokio::time::Instant::now() < until {
        match tokio::time::timeout_at(until, listener.read(&mut buf)).await {
            Ok(Ok(0)) => panic!("server closed a peer that was receiving broadcasts"),
            Ok(Ok(n)) => received += n,
            Ok(Err(e)) => panic!("read failed: {e}"),
            Err(_) => break,
        }
    }
    feeder.await.expect("feeder");

    assert!(received > 0);
    assert_eq!(registry.len(), 1);

    running.stop().await;
}

#[tokio::test]
async fn test_oversized_garbage_does_not_close_connection() {
    let (server, running) = start(local_config()).await;
    let mut raw = TcpStream::connect(running.socket_addr())
        .await
        .expect("connect");
    let registry = server.registry(Protocol::Socket);
    eventually(|| registry.len() == 1).await;

    raw.write_all(&vec![b'x'; 20_000]).await.expect("garbage");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let frame =
        FrameCodec::encode_frame(br#"{"protocol":"socket","userId":"after-noise"}"#).expect("frame");
    raw.write_all(&frame).await.expect("frame");

    eventually(|| server.metrics().messages_submitted() == 1).await;
    assert_eq!(registry.len(), 1);

    running.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_every_peer() {
    let (server, running) = start(local_config()).await;
    let tcp = tcp_client(&running).await;
    let ws = ws_client(&running).await;
    eventually(|| server.registry(Protocol::Socket).len() == 1).await;
    eventually(|| server.registry(Protocol::Websocket).len() == 1).await;

    tokio::time::timeout(WAIT, running.stop())
        .await
        .expect("stopped in time");

    assert!(server.registry(Protocol::Socket).is_empty());
    assert!(server.registry(Protocol::Websocket).is_empty());
    assert!(tokio::time::timeout(WAIT, tcp.next_payload())
        .await
        .expect("tcp closed")
        .is_err());
    assert!(tokio::time::timeout(WAIT, ws.next_broadcast())
        .await
        .expect("ws closed")
        .is_err());
}
