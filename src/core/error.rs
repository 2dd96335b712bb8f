//! Error types for the termcast protocol.

use thiserror::Error;

/// Errors from packet framing (encode/decode).
///
/// `IncompleteFrame` is the only recoverable variant: it tells the caller to
/// buffer more bytes. Everything else is treated as corruption for the
/// affected connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Not enough bytes for a complete header or declared payload.
    #[error("incomplete frame: need more bytes")]
    IncompleteFrame,

    /// Header magic did not match.
    #[error("bad packet magic: 0x{0:08x}")]
    BadMagic(u32),

    /// Unknown packet type tag.
    #[error("invalid packet type: {0}")]
    InvalidType(u16),

    /// Flags with reserved bits set.
    #[error("malformed flags: 0x{0:04x} (reserved bits must be 0)")]
    MalformedFlags(u16),

    /// Declared payload length exceeds the maximum.
    #[error("payload too large: {declared} bytes (max {max})")]
    PayloadTooLarge {
        /// Length declared in the header.
        declared: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Compression flag set on a zero-length payload.
    #[error("compressed flag set on empty payload")]
    EmptyCompressedPayload,

    /// Payload checksum did not match.
    #[error("checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    ChecksumMismatch {
        /// Checksum declared in the header.
        expected: u32,
        /// Checksum computed over the received payload.
        actual: u32,
    },

    /// Payload decompression failed.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// A structured payload (capability, media header) was malformed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Errors in the crypto layer.
#[cfg(feature = "crypto")]
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Handshake failed (malformed message, AEAD failure, bad state).
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Peer identity is not in the trust store under fail-closed policy.
    #[error("peer not trusted: {0}")]
    UnknownPeer(String),

    /// Sealing a packet failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Opening a packet failed (invalid tag, tampering, or key desync).
    #[error("decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Received nonce counter went backwards: replay or desync.
    #[error("nonce counter regression: got {got}, expected > {last}")]
    NonceRegression {
        /// Counter carried by the offending frame.
        got: u64,
        /// Highest counter accepted so far.
        last: u64,
    },

    /// Key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

/// Errors from bounded queue operations.
///
/// `Full` and `Empty` are expected flow-control signals, not failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Queue is at capacity (reject-newest policy, or non-blocking enqueue).
    #[error("queue full")]
    Full,

    /// Queue has no items (non-blocking dequeue).
    #[error("queue empty")]
    Empty,

    /// Queue is closed and fully drained.
    #[error("queue closed")]
    Closed,

    /// A timed dequeue expired.
    #[error("queue wait timed out")]
    Timeout,
}

/// Top-level termcast errors.
#[derive(Debug, Error)]
pub enum TermcastError {
    /// Framing error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Crypto error.
    #[cfg(feature = "crypto")]
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Illegal session state transition.
    #[error("invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Phase the session was in.
        from: crate::core::PhaseTag,
        /// Phase that was requested.
        to: crate::core::PhaseTag,
    },

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// No traffic from the peer within the dead interval.
    #[error("connection timed out (no traffic from peer)")]
    ConnectionDead,

    /// A plaintext frame arrived after the handshake completed.
    #[error("unexpected plaintext frame after handshake")]
    PlaintextAfterHandshake,

    /// An operation exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(&'static str),

    /// Session is shutting down.
    #[error("session shut down")]
    Shutdown,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Plain copy of the session phase used inside error values, so the error
/// type stays available without the `transport` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTag {
    /// No connection.
    Disconnected,
    /// Socket connect in progress.
    Connecting,
    /// Handshake running.
    Handshaking,
    /// Encrypted application traffic flowing.
    Connected,
    /// Terminal failure.
    Error,
}
