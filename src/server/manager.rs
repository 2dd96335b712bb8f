//! The multi-client server.
//!
//! Every accepted connection handshakes independently; only verified clients
//! enter the table. Each client owns a blocking control queue, a drop-oldest
//! media queue, and its own reader and writer tasks, so a slow or broken
//! client never blocks the others. The table lock guards membership only;
//! queue operations never run under it.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::BufferPool;
use crate::core::{
    TermcastError, CONTROL_QUEUE_CAPACITY, DEAD_INTERVAL, HANDSHAKE_TIMEOUT,
    KEEPALIVE_INTERVAL, MAX_CLIENTS, MEDIA_QUEUE_CAPACITY, SEND_STALL_GRACE,
};
use crate::crypto::{IdentityKeypair, PeerId, TrustStore};
use crate::protocol::{
    AudioBatch, MediaFrame, Packet, PacketType, ServerState, TerminalCapability,
};
use crate::queue::{OverflowPolicy, PacketQueue};
use crate::transport::{server_handshake, PacketReceiver, PacketSender};

/// Server configuration.
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// The server's long-term identity.
    pub identity: IdentityKeypair,
    /// Trust store consulted for client identities.
    pub trust: Arc<TrustStore>,
    /// Admission cap; connections beyond it are refused.
    pub max_clients: usize,
    /// Per-connection handshake deadline.
    pub handshake_timeout: Duration,
    /// A write stalled longer than this disconnects the client.
    pub send_stall_grace: Duration,
    /// Send a ping after this much write silence.
    pub keepalive_interval: Duration,
    /// Declare a client dead after this much read silence.
    pub dead_interval: Duration,
}

impl ServerConfig {
    /// Config with default limits and timeouts.
    pub fn new(bind_addr: SocketAddr, identity: IdentityKeypair) -> Self {
        Self {
            bind_addr,
            identity,
            trust: Arc::new(TrustStore::trust_on_first_use()),
            max_clients: MAX_CLIENTS,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            send_stall_grace: SEND_STALL_GRACE,
            keepalive_interval: KEEPALIVE_INTERVAL,
            dead_interval: DEAD_INTERVAL,
        }
    }

    /// Use a specific trust store.
    pub fn with_trust(mut self, trust: Arc<TrustStore>) -> Self {
        self.trust = trust;
        self
    }

    /// Override the admission cap.
    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Override the write stall grace period.
    pub fn with_send_stall_grace(mut self, grace: Duration) -> Self {
        self.send_stall_grace = grace;
        self
    }
}

/// Identifies a connected client for the lifetime of its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Events surfaced to the embedding application.
#[derive(Debug)]
pub enum ServerEvent {
    /// A client passed the handshake and entered the table.
    ClientConnected {
        /// Assigned session identifier.
        id: ClientId,
        /// The client's verified identity.
        peer: PeerId,
    },
    /// A client left the table.
    ClientDisconnected {
        /// Session identifier.
        id: ClientId,
        /// Human-readable reason.
        reason: String,
    },
    /// A client announced (or re-announced) its terminal capability.
    Capability {
        /// Session identifier.
        id: ClientId,
        /// The announced capability.
        capability: TerminalCapability,
    },
    /// A client sent a pixel frame.
    Frame {
        /// Session identifier.
        id: ClientId,
        /// The decoded frame.
        frame: MediaFrame,
    },
    /// A client sent an audio batch.
    Audio {
        /// Session identifier.
        id: ClientId,
        /// The decoded batch.
        batch: AudioBatch,
    },
}

struct ClientEntry {
    peer: PeerId,
    control: Arc<PacketQueue<Packet>>,
    media: Arc<PacketQueue<Packet>>,
    capability: parking_lot::Mutex<Option<TerminalCapability>>,
    writer_task: JoinHandle<()>,
    reader_task: JoinHandle<()>,
}

struct Shared {
    clients: RwLock<HashMap<ClientId, ClientEntry>>,
    events: mpsc::Sender<ServerEvent>,
    identity: IdentityKeypair,
    trust: Arc<TrustStore>,
    pool: Arc<BufferPool>,
    next_id: AtomicU32,
    max_clients: usize,
    handshake_timeout: Duration,
    send_stall_grace: Duration,
    keepalive_interval: Duration,
    dead_interval: Duration,
    shutdown: Notify,
}

/// A running chat server.
pub struct ChatServer {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl ChatServer {
    /// Bind, start accepting, and return the server handle plus the event
    /// stream. Only the bind itself can fail here; per-connection failures
    /// are logged and absorbed.
    pub async fn bind(
        config: ServerConfig,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), TermcastError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening");

        let (event_tx, event_rx) = mpsc::channel(256);
        let shared = Arc::new(Shared {
            clients: RwLock::new(HashMap::new()),
            events: event_tx,
            identity: config.identity,
            trust: config.trust,
            pool: BufferPool::with_defaults(),
            next_id: AtomicU32::new(1),
            max_clients: config.max_clients,
            handshake_timeout: config.handshake_timeout,
            send_stall_grace: config.send_stall_grace,
            keepalive_interval: config.keepalive_interval,
            dead_interval: config.dead_interval,
            shutdown: Notify::new(),
        });

        let accept_task = tokio::spawn(accept_loop(Arc::clone(&shared), listener));

        Ok((
            Self {
                shared,
                local_addr,
                accept_task,
            },
            event_rx,
        ))
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of clients currently in the table.
    pub async fn client_count(&self) -> usize {
        self.shared.clients.read().await.len()
    }

    /// The capability a client last announced, if any.
    pub async fn client_capability(&self, id: ClientId) -> Option<TerminalCapability> {
        let clients = self.shared.clients.read().await;
        clients.get(&id).and_then(|e| e.capability.lock().clone())
    }

    /// Broadcast a rendered text-art frame to every connected client.
    pub async fn broadcast_ascii(&self, frame: &MediaFrame) -> Result<usize, TermcastError> {
        self.broadcast_media(PacketType::AsciiFrame, frame.encode()?)
            .await
    }

    /// Broadcast a pixel frame to every connected client.
    pub async fn broadcast_pixel(&self, frame: &MediaFrame) -> Result<usize, TermcastError> {
        self.broadcast_media(PacketType::PixelFrame, frame.encode()?)
            .await
    }

    /// Broadcast an audio batch to every connected client.
    pub async fn broadcast_audio(&self, batch: &AudioBatch) -> Result<usize, TermcastError> {
        self.broadcast_media(PacketType::AudioFrame, batch.encode())
            .await
    }

    /// Payload is encoded once; each client gets its own packet on its own
    /// media queue, and each writer seals it under that client's key.
    async fn broadcast_media(
        &self,
        packet_type: PacketType,
        payload: Vec<u8>,
    ) -> Result<usize, TermcastError> {
        let clients = self.shared.clients.read().await;
        let mut delivered = 0;
        for entry in clients.values() {
            let packet = Packet::new(packet_type, payload.clone());
            if entry.media.try_enqueue(packet).is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Broadcast the current session summary on the control queues.
    ///
    /// Control traffic is never shed: a full queue is waited on, with the
    /// table lock released first so removal and broadcast to other clients
    /// proceed meanwhile. A queue closed by a concurrent removal skips that
    /// client.
    pub async fn broadcast_state(&self) -> Result<usize, TermcastError> {
        let (payload, queues) = {
            let clients = self.shared.clients.read().await;
            let state = ServerState {
                connected_clients: clients.len() as u32,
                active_streams: clients.len() as u32,
            };
            let queues: Vec<Arc<PacketQueue<Packet>>> = clients
                .values()
                .map(|entry| Arc::clone(&entry.control))
                .collect();
            (state.encode(), queues)
        };

        let mut delivered = 0;
        for control in queues {
            let packet = Packet::new(PacketType::ServerState, payload.clone());
            if control.enqueue(packet).await.is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Disconnect one client.
    pub async fn disconnect(&self, id: ClientId, reason: &str) {
        remove_client(&self.shared, id, reason).await;
    }

    /// Stop accepting and disconnect everyone.
    pub async fn shutdown(&self) {
        self.shared.shutdown.notify_waiters();
        let ids: Vec<ClientId> = self.shared.clients.read().await.keys().copied().collect();
        for id in ids {
            remove_client(&self.shared, id, "server shutting down").await;
        }
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        let (stream, addr) = tokio::select! {
            _ = shared.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };
        debug!(%addr, "incoming connection");
        tokio::spawn(admit_client(Arc::clone(&shared), stream, addr));
    }
}

/// Handshake a fresh connection and install it in the client table.
///
/// A connection that fails admission never touches the table.
async fn admit_client(shared: Arc<Shared>, stream: TcpStream, addr: SocketAddr) {
    if shared.clients.read().await.len() >= shared.max_clients {
        warn!(%addr, "refusing connection: server full");
        return;
    }
    if let Err(e) = stream.set_nodelay(true) {
        warn!(%addr, error = %e, "failed to configure socket");
        return;
    }

    let handshake = tokio::time::timeout(
        shared.handshake_timeout,
        server_handshake(
            stream,
            &shared.identity,
            &shared.trust,
            Arc::clone(&shared.pool),
        ),
    )
    .await;

    let (sender, receiver, peer) = match handshake {
        Ok(Ok(parts)) => parts,
        Ok(Err(e)) => {
            warn!(%addr, error = %e, "handshake failed");
            return;
        }
        Err(_) => {
            warn!(%addr, "handshake timed out");
            return;
        }
    };

    let id = ClientId(shared.next_id.fetch_add(1, Ordering::Relaxed));
    let control = Arc::new(PacketQueue::new(
        CONTROL_QUEUE_CAPACITY,
        OverflowPolicy::Block,
    ));
    let media = Arc::new(PacketQueue::new(
        MEDIA_QUEUE_CAPACITY,
        OverflowPolicy::DropOldest,
    ));

    // The reader waits for this before consuming packets, so the connected
    // event always precedes anything the client sends.
    let (admitted_tx, admitted_rx) = tokio::sync::oneshot::channel();

    let writer_task = tokio::spawn(writer_loop(
        Arc::clone(&shared),
        id,
        Arc::clone(&control),
        Arc::clone(&media),
        sender,
    ));
    let reader_task = tokio::spawn(reader_loop(
        Arc::clone(&shared),
        id,
        Arc::clone(&control),
        receiver,
        admitted_rx,
    ));

    let entry = ClientEntry {
        peer,
        control,
        media,
        capability: parking_lot::Mutex::new(None),
        writer_task,
        reader_task,
    };

    {
        let mut clients = shared.clients.write().await;
        if clients.len() >= shared.max_clients {
            // Raced past the early check; refuse late
            warn!(%addr, "refusing connection: server full");
            entry.writer_task.abort();
            entry.reader_task.abort();
            return;
        }
        clients.insert(id, entry);
    }

    info!(%id, %peer, %addr, "client connected");
    let _ = shared
        .events
        .send(ServerEvent::ClientConnected { id, peer })
        .await;
    let _ = admitted_tx.send(());
}

/// Remove a client from the table, close its queues, and stop its tasks.
///
/// Safe to call concurrently with broadcasts and from the client's own
/// tasks; the first caller wins, later calls find the entry gone.
async fn remove_client(shared: &Arc<Shared>, id: ClientId, reason: &str) {
    let entry = match shared.clients.write().await.remove(&id) {
        Some(entry) => entry,
        None => return,
    };
    entry.control.close();
    entry.media.close();

    info!(%id, peer = %entry.peer, %reason, "client disconnected");
    let _ = shared
        .events
        .send(ServerEvent::ClientDisconnected {
            id,
            reason: reason.to_string(),
        })
        .await;

    // Last: one of these may be the calling task, and abort lands at its
    // next await point.
    entry.writer_task.abort();
    entry.reader_task.abort();
}

async fn writer_loop(
    shared: Arc<Shared>,
    id: ClientId,
    control: Arc<PacketQueue<Packet>>,
    media: Arc<PacketQueue<Packet>>,
    mut sender: PacketSender,
) {
    let reason = loop {
        let packet = tokio::select! {
            biased;
            item = control.dequeue() => match item {
                Ok(packet) => packet,
                Err(_) => return, // closed by removal
            },
            item = media.dequeue() => match item {
                Ok(packet) => packet,
                Err(_) => return,
            },
            _ = tokio::time::sleep(shared.keepalive_interval / 2) => {
                if sender.idle() < shared.keepalive_interval {
                    continue;
                }
                Packet::ping()
            }
        };

        // A stalled socket must not hold this task hostage
        match tokio::time::timeout(shared.send_stall_grace, sender.send(&packet)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => break format!("write failed: {e}"),
            Err(_) => break "unresponsive: send stalled".to_string(),
        }
    };
    remove_client(&shared, id, &reason).await;
}

async fn reader_loop(
    shared: Arc<Shared>,
    id: ClientId,
    control: Arc<PacketQueue<Packet>>,
    mut receiver: PacketReceiver,
    admitted: tokio::sync::oneshot::Receiver<()>,
) {
    // A dropped sender means admission was refused after spawning
    if admitted.await.is_err() {
        return;
    }
    let reason = loop {
        let packet = match tokio::time::timeout(shared.dead_interval, receiver.recv()).await {
            Err(_) => break "no traffic from client".to_string(),
            Ok(Err(TermcastError::ConnectionClosed)) => break "connection closed".to_string(),
            Ok(Err(e)) => break e.to_string(),
            Ok(Ok(packet)) => packet,
        };

        match packet.packet_type {
            PacketType::Capability => match TerminalCapability::decode(&packet.payload) {
                Ok(capability) => {
                    if let Some(entry) = shared.clients.read().await.get(&id) {
                        *entry.capability.lock() = Some(capability.clone());
                    }
                    let _ = shared
                        .events
                        .send(ServerEvent::Capability { id, capability })
                        .await;
                }
                Err(e) => break format!("malformed capability: {e}"),
            },
            PacketType::PixelFrame | PacketType::AsciiFrame => {
                match MediaFrame::decode(&packet.payload) {
                    Ok(frame) => {
                        let _ = shared.events.send(ServerEvent::Frame { id, frame }).await;
                    }
                    Err(e) => break format!("malformed frame: {e}"),
                }
            }
            PacketType::AudioFrame => match AudioBatch::decode(&packet.payload) {
                Ok(batch) => {
                    let _ = shared.events.send(ServerEvent::Audio { id, batch }).await;
                }
                Err(e) => break format!("malformed audio: {e}"),
            },
            PacketType::Ping => {
                if control.try_enqueue(Packet::pong()).is_err() {
                    break "control queue unavailable".to_string();
                }
            }
            PacketType::Pong => {}
            PacketType::Goodbye => break "client said goodbye".to_string(),
            other => break format!("unexpected packet type {other:?}"),
        }
    };
    remove_client(&shared, id, &reason).await;
}
