//! End-to-end tests for the TCP client against live loopback listeners.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use hawser_remoting::{Channel, ChannelHandler, ConnectConfig, RemotingError, TransportClient};
use hawser_remoting_tcp::{ChannelRegistry, FrameCodec, TcpClient};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

struct CountingHandler {
    connected: AtomicUsize,
    disconnected: AtomicUsize,
    received: mpsc::UnboundedSender<Bytes>,
}

impl CountingHandler {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                connected: AtomicUsize::new(0),
                disconnected: AtomicUsize::new(0),
                received: tx,
            }),
            rx,
        )
    }
}

#[async_trait]
impl ChannelHandler for CountingHandler {
    async fn connected(&self, _channel: Arc<dyn Channel>) {
        self.connected.fetch_add(1, Ordering::AcqRel);
    }

    async fn disconnected(&self, _channel: Arc<dyn Channel>) {
        self.disconnected.fetch_add(1, Ordering::AcqRel);
    }

    async fn received(&self, _channel: Arc<dyn Channel>, payload: Bytes) {
        let _ = self.received.send(payload);
    }
}

/// Accepts connections, decodes frames, and echoes each payload back.
async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let (read_half, write_half) = stream.into_split();
                let mut frames = FramedRead::new(read_half, FrameCodec::new());
                let mut sink = tokio_util::codec::FramedWrite::new(write_half, FrameCodec::new());
                while let Some(Ok(payload)) = frames.next().await {
                    use futures::SinkExt;
                    if sink.send(payload).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

fn client_for(addr: SocketAddr, handler: Arc<CountingHandler>) -> (TcpClient, Arc<ChannelRegistry>) {
    let registry = ChannelRegistry::new();
    let client = TcpClient::with_registry(
        ConnectConfig::new(addr).connect_timeout(Duration::from_secs(1)),
        handler,
        Arc::clone(&registry),
    )
    .unwrap();
    (client, registry)
}

#[tokio::test]
async fn test_connect_send_receive() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let addr = spawn_echo_server().await;
    let (handler, mut received) = CountingHandler::new();
    let (client, _registry) = client_for(addr, Arc::clone(&handler));

    client.connect().await.unwrap();
    assert!(client.is_connected());
    assert!(client.channel().is_some());

    client.send(Bytes::from_static(b"hello"), true).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(2), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, Bytes::from_static(b"hello"));

    client.close().await;
}

#[tokio::test]
async fn test_send_without_connection_fails() {
    let addr = spawn_echo_server().await;
    let (handler, _received) = CountingHandler::new();
    let (client, _registry) = client_for(addr, handler);

    let result = client.send(Bytes::from_static(b"hello"), false).await;
    assert!(matches!(result, Err(RemotingError::NotConnected { .. })));
}

#[tokio::test]
async fn test_connect_failure_is_bounded_and_diagnostic() {
    // TEST-NET-1 is guaranteed unroutable; depending on the network stack
    // this surfaces as a timeout or an unreachable error.
    let addr: SocketAddr = "192.0.2.1:80".parse().unwrap();
    let (handler, _received) = CountingHandler::new();
    let registry = ChannelRegistry::new();
    let client = TcpClient::with_registry(
        ConnectConfig::new(addr).connect_timeout(Duration::from_millis(300)),
        handler,
        registry,
    )
    .unwrap();

    let started = Instant::now();
    let result = client.connect().await;
    assert!(started.elapsed() < Duration::from_secs(2));

    match result {
        Err(RemotingError::Connect(e)) => {
            assert_eq!(e.addr(), addr);
        }
        other => panic!("expected connect error, got {other:?}"),
    }
    assert!(!client.is_connected());
    assert!(client.channel().is_none());
}

#[tokio::test]
async fn test_reconnect_retires_previous_connection() {
    let addr = spawn_echo_server().await;
    let (handler, _received) = CountingHandler::new();
    let (client, registry) = client_for(addr, handler);

    client.connect().await.unwrap();
    let old_channel = client.channel().unwrap();

    client.connect().await.unwrap();
    let new_channel = client.channel().unwrap();

    assert!(!old_channel.is_connected());
    assert!(new_channel.is_connected());
    assert_ne!(old_channel.local_addr(), new_channel.local_addr());
    // The retired connection's wrapper is gone; only the new one remains.
    assert_eq!(registry.len(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_reconnect_is_noop_while_connected() {
    let addr = spawn_echo_server().await;
    let (handler, _received) = CountingHandler::new();
    let (client, _registry) = client_for(addr, handler);

    client.connect().await.unwrap();
    let before = client.channel().unwrap().local_addr();
    client.reconnect().await.unwrap();
    assert_eq!(client.channel().unwrap().local_addr(), before);

    client.close().await;
}

#[tokio::test]
async fn test_close_is_terminal_and_idempotent() {
    let addr = spawn_echo_server().await;
    let (handler, _received) = CountingHandler::new();
    let (client, registry) = client_for(addr, handler);

    client.connect().await.unwrap();
    client.close().await;
    client.close().await;

    assert!(client.is_closed());
    assert!(!client.is_connected());
    assert!(client.channel().is_none());
    assert!(registry.is_empty());
    assert!(matches!(
        client.connect().await,
        Err(RemotingError::ClientClosed)
    ));
}

#[tokio::test]
async fn test_close_racing_connect_never_publishes() {
    let addr = spawn_echo_server().await;

    // Drive many connect/close races; whatever interleaving wins, a closed
    // client must never end up with a published connection.
    for _ in 0..20 {
        let (handler, _received) = CountingHandler::new();
        let (client, registry) = client_for(addr, handler);
        let client = Arc::new(client);

        let connector = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.connect().await })
        };
        tokio::task::yield_now().await;
        client.close().await;
        let _ = connector.await.unwrap();

        assert!(client.is_closed());
        assert!(client.channel().is_none());
        assert!(registry.is_empty());
    }
}

#[tokio::test]
async fn test_peer_close_is_observed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (handler, _received) = CountingHandler::new();
    let (client, registry) = client_for(addr, Arc::clone(&handler));

    let (accept, connect) = tokio::join!(listener.accept(), client.connect());
    connect.unwrap();
    let (server_stream, _) = accept.unwrap();
    drop(server_stream);

    // The read task observes EOF, marks the connection dead, and removes
    // the wrapper.
    tokio::time::timeout(Duration::from_secs(2), async {
        while client.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(client.channel().is_none());
    tokio::time::timeout(Duration::from_secs(2), async {
        while handler.disconnected.load(Ordering::Acquire) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(registry.is_empty());

    client.close().await;
}

#[tokio::test]
async fn test_connected_event_fires() {
    let addr = spawn_echo_server().await;
    let (handler, _received) = CountingHandler::new();
    let (client, _registry) = client_for(addr, Arc::clone(&handler));

    client.connect().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while handler.connected.load(Ordering::Acquire) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    client.close().await;
}
