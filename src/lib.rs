//! # Termcast Protocol
//!
//! Secure streaming protocol engine for real-time terminal video/audio chat.
//!
//! Webcam and microphone capture is converted (by external collaborators) into
//! text-art/audio frames; this crate moves those frames between peers:
//!
//! - **Framing**: a fixed big-endian packet format with CRC32 integrity and
//!   optional zstd payload compression
//! - **Security**: a Noise_XX handshake with known-peer pinning, then
//!   XChaCha20-Poly1305 sealing of every packet with per-session keys
//! - **Fan-out**: a server that broadcasts media to many clients with bounded
//!   per-client queues, isolating slow clients from healthy ones
//! - **Backpressure**: one bounded-queue abstraction with block, drop-oldest,
//!   and reject-newest overflow policies selected per use site
//!
//! ## Feature Flags
//!
//! - `crypto` (default): handshake and session sealing (snow, chacha20poly1305)
//! - `transport` (default): wire framing, socket I/O, bounded queues (tokio)
//! - `client` / `server` (default): the high-level session APIs
//!
//! ## Modules
//!
//! - [`core`]: constants and error types (always included)
//! - [`buffer`]: buffer pool and capture frame ring (always included)
//! - [`protocol`]: packet framing and payload codecs (always included)
//! - [`crypto`]: identity, handshake, trust store, session sealing
//! - [`queue`]: bounded packet queue with overflow policies
//! - [`transport`]: session state machine and framed socket I/O
//! - [`client`] / [`server`]: connection orchestration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

// Core module (always included)
pub mod core;

// Buffer management (always included)
pub mod buffer;

// Packet framing and payload codecs (always included)
pub mod protocol;

// Crypto layer (feature-gated)
#[cfg(feature = "crypto")]
pub mod crypto;

// Bounded queues (feature-gated with transport)
#[cfg(feature = "transport")]
pub mod queue;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
pub mod transport;

// Client API (feature-gated)
#[cfg(feature = "client")]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::buffer::{BufferPool, FrameRing, PooledBuf};
    pub use crate::core::*;
    pub use crate::protocol::{
        AudioBatch, MediaFrame, Packet, PacketCodec, PacketFlags, PacketType, ServerState,
        TerminalCapability,
    };

    #[cfg(feature = "crypto")]
    pub use crate::crypto::{IdentityKeypair, PeerId, SessionKeys, TrustPolicy, TrustStore};

    #[cfg(feature = "transport")]
    pub use crate::queue::{OverflowPolicy, PacketQueue};

    #[cfg(feature = "transport")]
    pub use crate::transport::SessionPhase;

    #[cfg(feature = "client")]
    pub use crate::client::{ChatClient, ClientConfig, ClientEvent};

    #[cfg(feature = "server")]
    pub use crate::server::{ChatServer, ClientId, ServerConfig, ServerEvent};
}

// Re-export commonly used items at crate root
pub use crate::core::{FramingError, QueueError, TermcastError};
pub use crate::protocol::{Packet, PacketCodec, PacketType};

#[cfg(feature = "crypto")]
pub use crate::crypto::{IdentityKeypair, PeerId, TrustStore};

#[cfg(feature = "client")]
pub use crate::client::ChatClient;

#[cfg(feature = "server")]
pub use crate::server::ChatServer;
