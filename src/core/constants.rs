//! Protocol constants.
//!
//! Wire-format values are fixed by the protocol and MUST NOT be changed;
//! timing values are defaults that configs may override.

use std::time::Duration;

// =============================================================================
// PACKET FRAMING
// =============================================================================

/// Magic number opening every packet header.
pub const PACKET_MAGIC: u32 = 0xDEAD_BEEF;

/// Packet header size: magic + type + flags + length + checksum + timestamp.
pub const PACKET_HEADER_SIZE: usize = 4 + 2 + 2 + 4 + 4 + 8;

/// Maximum payload size. A header declaring more than this is treated as
/// corrupt rather than allocated for.
pub const MAX_PAYLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Minimum payload size to attempt compression.
pub const MIN_COMPRESS_SIZE: usize = 512;

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// =============================================================================
// WIRE TRANSPORT
// =============================================================================

/// Outer wire prefix: length (4) + frame kind (1).
pub const WIRE_PREFIX_SIZE: usize = 5;

/// Wire frame kind: plaintext handshake packet.
pub const WIRE_KIND_PLAIN: u8 = 0x00;

/// Wire frame kind: sealed (encrypted) packet.
pub const WIRE_KIND_SEALED: u8 = 0x01;

/// Maximum bytes in a single wire frame body: kind + nonce + sealed packet.
pub const MAX_WIRE_FRAME_SIZE: usize =
    MAX_PAYLOAD_SIZE + PACKET_HEADER_SIZE + AEAD_TAG_SIZE + 16;

// =============================================================================
// CRYPTO
// =============================================================================

/// X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 private key size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// BLAKE2s handshake hash size.
pub const HASH_SIZE: usize = 32;

/// XChaCha20 session key size.
pub const SESSION_KEY_SIZE: usize = 32;

/// XChaCha20 nonce size.
pub const AEAD_NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

// =============================================================================
// TIMING DEFAULTS
// =============================================================================

/// Default TCP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default handshake timeout. Exceeding it aborts the attempt.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Send a keepalive ping if nothing has been written for this long.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Consider the peer dead after this long without any inbound traffic.
pub const DEAD_INTERVAL: Duration = Duration::from_secs(30);

/// A client whose socket write stalls past this is disconnected as
/// unresponsive rather than allowed to backpressure the server.
pub const SEND_STALL_GRACE: Duration = Duration::from_secs(5);

// =============================================================================
// QUEUES AND POOLS
// =============================================================================

/// Default capacity of a per-connection media send queue (drop-oldest).
pub const MEDIA_QUEUE_CAPACITY: usize = 32;

/// Default capacity of a per-connection control send queue (blocking).
pub const CONTROL_QUEUE_CAPACITY: usize = 64;

/// Default capacity of the client-side capture staging ring.
pub const CAPTURE_RING_CAPACITY: usize = 4;

/// Default number of buffers held by the shared buffer pool.
pub const BUFFER_POOL_SIZE: usize = 64;

/// Default per-buffer capacity in the shared buffer pool.
pub const BUFFER_POOL_BUF_CAPACITY: usize = 64 * 1024;

// =============================================================================
// SESSION
// =============================================================================

/// Protocol version carried in handshake payloads.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default maximum number of simultaneously connected clients.
pub const MAX_CLIENTS: usize = 10;
