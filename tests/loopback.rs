//! End-to-end scenarios over 127.0.0.1.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use termcast_protocol::buffer::BufferPool;
use termcast_protocol::client::{ChatClient, ClientConfig, ClientEvent};
use termcast_protocol::crypto::{IdentityKeypair, TrustStore};
use termcast_protocol::prelude::*;
use termcast_protocol::server::{ChatServer, ServerConfig, ServerEvent};
use termcast_protocol::transport::client_handshake;

const EVENT_WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Incompressible-ish payload so zstd cannot shrink large frames away.
fn noise_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

async fn start_server(trust: Arc<TrustStore>) -> (ChatServer, mpsc::Receiver<ServerEvent>) {
    let identity = IdentityKeypair::generate().unwrap();
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), identity)
        .with_trust(trust)
        .with_send_stall_grace(Duration::from_millis(300));
    ChatServer::bind(config).await.unwrap()
}

async fn connect_client(
    server: &ChatServer,
    capability: TerminalCapability,
) -> (ChatClient, mpsc::Receiver<ClientEvent>) {
    let identity = IdentityKeypair::generate().unwrap();
    let config = ClientConfig::new(server.local_addr(), identity)
        .with_trust(Arc::new(TrustStore::trust_on_first_use()))
        .with_capability(capability);
    ChatClient::connect(config).await.unwrap()
}

async fn expect_capability(events: &mut mpsc::Receiver<ServerEvent>) -> TerminalCapability {
    loop {
        match timeout(EVENT_WAIT, events.recv()).await.unwrap().unwrap() {
            ServerEvent::Capability { capability, .. } => return capability,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn end_to_end_handshake_capability_broadcast() {
    init_tracing();
    let (server, mut server_events) = start_server(Arc::new(TrustStore::trust_on_first_use())).await;
    let (client, mut client_events) = connect_client(&server, TerminalCapability::basic(80, 24)).await;

    // Client sees the connection
    match timeout(EVENT_WAIT, client_events.recv()).await.unwrap().unwrap() {
        ClientEvent::Connected { server: id } => assert_eq!(id, client.server_id()),
        other => panic!("expected Connected, got {other:?}"),
    }

    // Server sees the client and its announced 80x24 capability
    match timeout(EVENT_WAIT, server_events.recv()).await.unwrap().unwrap() {
        ServerEvent::ClientConnected { .. } => {}
        other => panic!("expected ClientConnected, got {other:?}"),
    }
    let cap = expect_capability(&mut server_events).await;
    assert_eq!((cap.width, cap.height), (80, 24));
    assert_eq!(server.client_count().await, 1);

    // Broadcast a frame and check the client decodes it intact
    let frame = MediaFrame {
        width: 80,
        height: 24,
        format: 0,
        timestamp_ms: 1_000,
        data: noise_bytes(80 * 24),
    };
    assert_eq!(server.broadcast_ascii(&frame).await.unwrap(), 1);

    loop {
        match timeout(EVENT_WAIT, client_events.recv()).await.unwrap().unwrap() {
            ClientEvent::AsciiFrame(got) => {
                assert_eq!((got.width, got.height), (80, 24));
                assert_eq!(got.data, frame.data);
                break;
            }
            ClientEvent::Disconnected { reason } => panic!("disconnected early: {reason}"),
            _ => continue,
        }
    }

    client.disconnect();
}

#[tokio::test]
async fn server_state_broadcast_reaches_every_client() {
    init_tracing();
    let (server, mut server_events) = start_server(Arc::new(TrustStore::trust_on_first_use())).await;
    let (client, mut client_events) = connect_client(&server, TerminalCapability::basic(80, 24)).await;

    match timeout(EVENT_WAIT, server_events.recv()).await.unwrap().unwrap() {
        ServerEvent::ClientConnected { .. } => {}
        other => panic!("expected ClientConnected, got {other:?}"),
    }

    assert_eq!(server.broadcast_state().await.unwrap(), 1);

    loop {
        match timeout(EVENT_WAIT, client_events.recv()).await.unwrap().unwrap() {
            ClientEvent::ServerState(state) => {
                assert_eq!(state.connected_clients, 1);
                break;
            }
            ClientEvent::Disconnected { reason } => panic!("disconnected early: {reason}"),
            _ => continue,
        }
    }

    client.disconnect();
}

#[tokio::test]
async fn resize_reannounces_capability_without_rehandshake() {
    init_tracing();
    let (server, mut server_events) = start_server(Arc::new(TrustStore::trust_on_first_use())).await;
    let (client, _client_events) = connect_client(&server, TerminalCapability::basic(80, 24)).await;

    // Swallow connect + initial capability
    match timeout(EVENT_WAIT, server_events.recv()).await.unwrap().unwrap() {
        ServerEvent::ClientConnected { .. } => {}
        other => panic!("expected ClientConnected, got {other:?}"),
    }
    let initial = expect_capability(&mut server_events).await;
    assert_eq!((initial.width, initial.height), (80, 24));

    client.update_terminal_size(132, 43).await.unwrap();

    // Exactly one new capability, no new connection
    let updated = expect_capability(&mut server_events).await;
    assert_eq!((updated.width, updated.height), (132, 43));
    assert_eq!(server.client_count().await, 1);

    // The session survived: no disconnect event and no stray capability
    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(event) = server_events.try_recv() {
        match event {
            ServerEvent::Capability { .. } => panic!("capability sent more than once"),
            ServerEvent::ClientConnected { .. } => panic!("session was re-established"),
            ServerEvent::ClientDisconnected { reason, .. } => {
                panic!("session dropped: {reason}")
            }
            _ => {}
        }
    }

    client.disconnect();
}

#[tokio::test]
async fn fail_closed_client_rejects_unknown_server() {
    init_tracing();
    let (server, mut server_events) = start_server(Arc::new(TrustStore::trust_on_first_use())).await;

    // Default client trust is fail-closed with nothing pinned: the server's
    // identity is rejected as soon as it is learned, before the final
    // handshake message, so no session is ever established.
    let identity = IdentityKeypair::generate().unwrap();
    let config = ClientConfig::new(server.local_addr(), identity);
    assert!(ChatClient::connect(config).await.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.client_count().await, 0);
    assert!(server_events.try_recv().is_err());
}

#[tokio::test]
async fn fail_closed_server_never_admits_unknown_client() {
    init_tracing();
    let (server, mut server_events) = start_server(Arc::new(TrustStore::fail_closed())).await;

    // The server only learns the client identity from the final handshake
    // message, so the client may believe it connected before the server
    // rejects it and drops the socket.
    let identity = IdentityKeypair::generate().unwrap();
    let config = ClientConfig::new(server.local_addr(), identity)
        .with_trust(Arc::new(TrustStore::trust_on_first_use()));
    if let Ok((client, mut client_events)) = ChatClient::connect(config).await {
        loop {
            match timeout(EVENT_WAIT, client_events.recv()).await.unwrap().unwrap() {
                ClientEvent::Disconnected { .. } => break,
                ClientEvent::Connected { .. } => continue,
                other => panic!("unexpected event from rejected session: {other:?}"),
            }
        }
        client.disconnect();
    }

    // The rejected connection never reaches the table or the event stream
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.client_count().await, 0);
    assert!(server_events.try_recv().is_err());
}

#[tokio::test]
async fn stalled_client_does_not_block_healthy_client() {
    init_tracing();
    let (server, mut server_events) = start_server(Arc::new(TrustStore::trust_on_first_use())).await;
    let (healthy, mut healthy_events) = connect_client(&server, TerminalCapability::basic(80, 24)).await;

    // A bare transport-level client that handshakes and then never reads
    let identity = IdentityKeypair::generate().unwrap();
    let trust = TrustStore::trust_on_first_use();
    let stream = tokio::net::TcpStream::connect(server.local_addr()).await.unwrap();
    let (_stalled_tx, stalled_rx, _server_id) =
        client_handshake(stream, &identity, &trust, BufferPool::with_defaults())
            .await
            .unwrap();

    // Wait until both clients are in the table
    let deadline = tokio::time::Instant::now() + EVENT_WAIT;
    while server.client_count().await < 2 {
        assert!(tokio::time::Instant::now() < deadline, "second client never admitted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Large incompressible frames fill the stalled client's socket buffers
    let frame = MediaFrame {
        width: 640,
        height: 480,
        format: 1,
        timestamp_ms: 0,
        data: noise_bytes(512 * 1024),
    };
    for _ in 0..40 {
        server.broadcast_ascii(&frame).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    // The healthy client keeps receiving intact frames throughout
    let mut received = 0;
    while received < 3 {
        match timeout(EVENT_WAIT, healthy_events.recv()).await.unwrap().unwrap() {
            ClientEvent::AsciiFrame(got) => {
                assert_eq!(got.data, frame.data);
                received += 1;
            }
            ClientEvent::Disconnected { reason } => panic!("healthy client dropped: {reason}"),
            _ => continue,
        }
    }

    // The stalled client gets disconnected as unresponsive
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "stalled client never removed"
        );
        match timeout(EVENT_WAIT, server_events.recv()).await.unwrap().unwrap() {
            ServerEvent::ClientDisconnected { .. } => break,
            _ => continue,
        }
    }
    assert_eq!(server.client_count().await, 1);

    drop(stalled_rx);
    healthy.disconnect();
}
