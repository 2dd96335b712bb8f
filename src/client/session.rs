//! The client side of a chat session.
//!
//! `ChatClient::connect` drives the socket connect and handshake, then
//! splits into three tasks: a writer draining the control and media queues,
//! a reader routing inbound packets into [`ClientEvent`]s, and a pump moving
//! captured frames from the staging ring onto the media queue. Capture
//! threads stay synchronous; they only touch the ring.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::{BufferPool, FrameRing};
use crate::core::{
    TermcastError, CAPTURE_RING_CAPACITY, CONNECT_TIMEOUT, CONTROL_QUEUE_CAPACITY,
    DEAD_INTERVAL, HANDSHAKE_TIMEOUT, KEEPALIVE_INTERVAL, MEDIA_QUEUE_CAPACITY,
};
use crate::crypto::{IdentityKeypair, PeerId, TrustStore};
use crate::protocol::{
    AudioBatch, MediaFrame, Packet, PacketType, ServerState, TerminalCapability,
};
use crate::queue::{OverflowPolicy, PacketQueue};
use crate::transport::{
    client_handshake, PacketReceiver, PacketSender, SessionPhase, SessionState,
};

/// Client connection configuration.
pub struct ClientConfig {
    /// Server address to connect to.
    pub server_addr: SocketAddr,
    /// This client's long-term identity.
    pub identity: IdentityKeypair,
    /// Trust store consulted for the server's identity.
    pub trust: Arc<TrustStore>,
    /// Capability announced right after the handshake.
    pub capability: TerminalCapability,
    /// TCP connect deadline.
    pub connect_timeout: Duration,
    /// Handshake deadline.
    pub handshake_timeout: Duration,
    /// Send a ping after this much write silence.
    pub keepalive_interval: Duration,
    /// Declare the server dead after this much read silence.
    pub dead_interval: Duration,
}

impl ClientConfig {
    /// Config with default timeouts and an 80x24 capability.
    pub fn new(server_addr: SocketAddr, identity: IdentityKeypair) -> Self {
        Self {
            server_addr,
            identity,
            trust: Arc::new(TrustStore::fail_closed()),
            capability: TerminalCapability::basic(80, 24),
            connect_timeout: CONNECT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
            dead_interval: DEAD_INTERVAL,
        }
    }

    /// Use a specific trust store.
    pub fn with_trust(mut self, trust: Arc<TrustStore>) -> Self {
        self.trust = trust;
        self
    }

    /// Announce a specific capability.
    pub fn with_capability(mut self, capability: TerminalCapability) -> Self {
        self.capability = capability;
        self
    }

    /// Override the keepalive interval.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Override the dead interval.
    pub fn with_dead_interval(mut self, interval: Duration) -> Self {
        self.dead_interval = interval;
        self
    }
}

/// Events surfaced to the embedding application.
#[derive(Debug)]
pub enum ClientEvent {
    /// Handshake completed; the session is live.
    Connected {
        /// The server's verified identity.
        server: PeerId,
    },
    /// A rendered text-art frame arrived.
    AsciiFrame(MediaFrame),
    /// A raw pixel frame arrived.
    PixelFrame(MediaFrame),
    /// An audio batch arrived.
    Audio(AudioBatch),
    /// Server-side session state update.
    ServerState(ServerState),
    /// The session ended. Terminal event.
    Disconnected {
        /// Human-readable reason.
        reason: String,
    },
}

struct Shared {
    control: PacketQueue<Packet>,
    media: PacketQueue<Packet>,
    capture: FrameRing<(PacketType, MediaFrame)>,
    capability: Mutex<TerminalCapability>,
    state: Mutex<SessionState>,
    disconnected: AtomicBool,
}

/// A connected chat client.
pub struct ChatClient {
    shared: Arc<Shared>,
    server_id: PeerId,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatClient {
    /// Connect, handshake, announce the capability, and start the session
    /// tasks. Returns the client handle and the event stream.
    pub async fn connect(
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>), TermcastError> {
        let pool = BufferPool::with_defaults();
        let mut state = SessionState::new();

        state.transition(SessionPhase::Connecting)?;
        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(config.server_addr),
        )
        .await
        .map_err(|_| TermcastError::Timeout("connect"))??;
        stream.set_nodelay(true)?;

        state.transition(SessionPhase::Handshaking)?;
        let (sender, receiver, server_id) = tokio::time::timeout(
            config.handshake_timeout,
            client_handshake(stream, &config.identity, &config.trust, pool),
        )
        .await
        .map_err(|_| TermcastError::Timeout("handshake"))??;
        state.transition(SessionPhase::Connected)?;
        info!(server = %server_id, "connected");

        let shared = Arc::new(Shared {
            control: PacketQueue::new(CONTROL_QUEUE_CAPACITY, OverflowPolicy::Block),
            media: PacketQueue::new(MEDIA_QUEUE_CAPACITY, OverflowPolicy::DropOldest),
            capture: FrameRing::new(CAPTURE_RING_CAPACITY),
            capability: Mutex::new(config.capability),
            state: Mutex::new(state),
            disconnected: AtomicBool::new(false),
        });

        let (event_tx, event_rx) = mpsc::channel(64);
        let _ = event_tx
            .send(ClientEvent::Connected { server: server_id })
            .await;

        // Capability goes out before any media
        let cap_bytes = shared.capability.lock().encode()?;
        shared
            .control
            .enqueue(Packet::new(PacketType::Capability, cap_bytes))
            .await?;

        let tasks = vec![
            tokio::spawn(writer_loop(
                Arc::clone(&shared),
                sender,
                config.keepalive_interval,
            )),
            tokio::spawn(reader_loop(
                Arc::clone(&shared),
                receiver,
                event_tx,
                config.dead_interval,
            )),
            tokio::spawn(pump_loop(Arc::clone(&shared))),
        ];

        Ok((
            Self {
                shared,
                server_id,
                tasks,
            },
            event_rx,
        ))
    }

    /// The server's verified identity.
    pub fn server_id(&self) -> PeerId {
        self.server_id
    }

    /// Current session phase.
    pub fn phase(&self) -> SessionPhase {
        self.shared.state.lock().phase()
    }

    /// Stage a captured pixel frame for sending. Returns the frame evicted
    /// from the staging ring, if capture outran the pump.
    pub fn stage_video_frame(&self, frame: MediaFrame) -> Option<MediaFrame> {
        self.shared
            .capture
            .push((PacketType::PixelFrame, frame))
            .map(|(_, evicted)| evicted)
    }

    /// Send an audio batch on the media queue.
    pub async fn send_audio(&self, batch: AudioBatch) -> Result<(), TermcastError> {
        let packet = Packet::new(PacketType::AudioFrame, batch.encode());
        self.shared.media.enqueue(packet).await?;
        Ok(())
    }

    /// Announce new terminal dimensions.
    ///
    /// Sends exactly one fresh capability packet; the handshake is not
    /// re-run and the session keys are untouched.
    pub async fn update_terminal_size(&self, width: u16, height: u16) -> Result<(), TermcastError> {
        let bytes = {
            let mut cap = self.shared.capability.lock();
            cap.width = width;
            cap.height = height;
            cap.encode()?
        };
        debug!(width, height, "announcing new terminal size");
        self.shared
            .control
            .enqueue(Packet::new(PacketType::Capability, bytes))
            .await?;
        Ok(())
    }

    /// Tear the session down. Idempotent; safe to call at any point.
    pub fn disconnect(&self) {
        if self.shared.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        // Goodbye drains ahead of the close
        let _ = self.shared.control.try_enqueue(Packet::goodbye());
        self.shared.control.close();
        self.shared.media.close();
        // Legal from every phase
        let _ = self
            .shared
            .state
            .lock()
            .transition(SessionPhase::Disconnected);
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.disconnect();
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn writer_loop(shared: Arc<Shared>, mut sender: PacketSender, keepalive: Duration) {
    loop {
        tokio::select! {
            biased;
            item = shared.control.dequeue() => match item {
                Ok(packet) => {
                    let is_goodbye = packet.packet_type == PacketType::Goodbye;
                    if sender.send(&packet).await.is_err() || is_goodbye {
                        break;
                    }
                }
                Err(_) => break,
            },
            item = shared.media.dequeue() => match item {
                Ok(packet) => {
                    if sender.send(&packet).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            _ = tokio::time::sleep(keepalive / 2) => {
                if sender.idle() >= keepalive && sender.send(&Packet::ping()).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn reader_loop(
    shared: Arc<Shared>,
    mut receiver: PacketReceiver,
    events: mpsc::Sender<ClientEvent>,
    dead_interval: Duration,
) {
    let reason = loop {
        let packet = match tokio::time::timeout(dead_interval, receiver.recv()).await {
            Err(_) => break "no traffic from server".to_string(),
            Ok(Err(TermcastError::ConnectionClosed)) => break "connection closed".to_string(),
            Ok(Err(e)) => {
                let _ = shared.state.lock().transition(SessionPhase::Error);
                break e.to_string();
            }
            Ok(Ok(packet)) => packet,
        };

        match packet.packet_type {
            PacketType::AsciiFrame => match MediaFrame::decode(&packet.payload) {
                Ok(frame) => {
                    let _ = events.send(ClientEvent::AsciiFrame(frame)).await;
                }
                Err(e) => {
                    let _ = shared.state.lock().transition(SessionPhase::Error);
                    break format!("malformed frame: {e}");
                }
            },
            PacketType::PixelFrame => match MediaFrame::decode(&packet.payload) {
                Ok(frame) => {
                    let _ = events.send(ClientEvent::PixelFrame(frame)).await;
                }
                Err(e) => {
                    let _ = shared.state.lock().transition(SessionPhase::Error);
                    break format!("malformed frame: {e}");
                }
            },
            PacketType::AudioFrame => match AudioBatch::decode(&packet.payload) {
                Ok(batch) => {
                    let _ = events.send(ClientEvent::Audio(batch)).await;
                }
                Err(e) => {
                    let _ = shared.state.lock().transition(SessionPhase::Error);
                    break format!("malformed audio: {e}");
                }
            },
            PacketType::ServerState => {
                if let Ok(state) = ServerState::decode(&packet.payload) {
                    let _ = events.send(ClientEvent::ServerState(state)).await;
                }
            }
            PacketType::Ping => {
                if shared.control.try_enqueue(Packet::pong()).is_err() {
                    break "control queue unavailable".to_string();
                }
            }
            PacketType::Pong => {}
            PacketType::Goodbye => break "server said goodbye".to_string(),
            other => {
                warn!(packet_type = ?other, "unexpected packet type from server");
            }
        }
    };

    if !shared.disconnected.swap(true, Ordering::SeqCst) {
        shared.control.close();
        shared.media.close();
        let _ = shared
            .state
            .lock()
            .transition(SessionPhase::Disconnected);
    }
    info!(%reason, "session ended");
    let _ = events.send(ClientEvent::Disconnected { reason }).await;
}

/// Moves staged frames from the capture ring onto the media queue.
async fn pump_loop(shared: Arc<Shared>) {
    let mut tick = tokio::time::interval(Duration::from_millis(5));
    loop {
        tick.tick().await;
        if shared.media.is_closed() {
            break;
        }
        while let Some((packet_type, frame)) = shared.capture.pop() {
            let payload = match frame.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "dropping unencodable frame");
                    continue;
                }
            };
            if shared
                .media
                .try_enqueue(Packet::new(packet_type, payload))
                .is_err()
            {
                return;
            }
        }
    }
}
