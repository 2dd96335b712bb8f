//! Packet types, flags, and the in-memory packet representation.

/// Packet type identifiers.
///
/// Types 1-3 are reserved for handshake messages and are the only packets
/// ever sent in plaintext; everything else travels sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    /// Handshake message 1 (client -> server).
    HandshakeInit = 1,
    /// Handshake message 2 (server -> client).
    HandshakeResp = 2,
    /// Handshake message 3 (client -> server).
    HandshakeFin = 3,
    /// Terminal capability announcement (client -> server).
    Capability = 4,
    /// Rendered text-art frame.
    AsciiFrame = 5,
    /// Raw pixel frame (client camera -> server).
    PixelFrame = 6,
    /// Batched audio samples.
    AudioFrame = 7,
    /// Keepalive probe.
    Ping = 8,
    /// Keepalive answer.
    Pong = 9,
    /// Server-side session state update.
    ServerState = 10,
    /// Clean disconnect notification.
    Goodbye = 11,
}

impl PacketType {
    /// Parse a packet type from its wire tag.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::HandshakeInit),
            2 => Some(Self::HandshakeResp),
            3 => Some(Self::HandshakeFin),
            4 => Some(Self::Capability),
            5 => Some(Self::AsciiFrame),
            6 => Some(Self::PixelFrame),
            7 => Some(Self::AudioFrame),
            8 => Some(Self::Ping),
            9 => Some(Self::Pong),
            10 => Some(Self::ServerState),
            11 => Some(Self::Goodbye),
            _ => None,
        }
    }

    /// Wire tag for this type.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Handshake messages are never encrypted.
    pub fn is_handshake(self) -> bool {
        matches!(
            self,
            Self::HandshakeInit | Self::HandshakeResp | Self::HandshakeFin
        )
    }

    /// Media packets go on drop-oldest queues; everything else is control.
    pub fn is_media(self) -> bool {
        matches!(self, Self::AsciiFrame | Self::PixelFrame | Self::AudioFrame)
    }
}

/// Packet flag bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(u16);

impl PacketFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Payload is zstd-compressed.
    pub const COMPRESSED: Self = Self(0x0001);
    /// Payload is the final fragment of a logical unit.
    pub const LAST_FRAGMENT: Self = Self(0x0002);

    /// Create flags from the raw wire value.
    pub fn from_u16(value: u16) -> Self {
        Self(value)
    }

    /// Raw wire value.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Check if the compressed flag is set.
    pub fn is_compressed(self) -> bool {
        self.0 & Self::COMPRESSED.0 != 0
    }

    /// Check if the last-fragment flag is set.
    pub fn is_last_fragment(self) -> bool {
        self.0 & Self::LAST_FRAGMENT.0 != 0
    }

    /// Set the compressed flag.
    pub fn with_compressed(self) -> Self {
        Self(self.0 | Self::COMPRESSED.0)
    }

    /// Clear the compressed flag.
    pub fn without_compressed(self) -> Self {
        Self(self.0 & !Self::COMPRESSED.0)
    }

    /// Set the last-fragment flag.
    pub fn with_last_fragment(self) -> Self {
        Self(self.0 | Self::LAST_FRAGMENT.0)
    }

    /// Reserved bits must be zero.
    pub fn is_valid(self) -> bool {
        self.0 & !0x0003 == 0
    }
}

/// An in-memory application packet.
///
/// The compression flag is managed by the codec: callers never set it, and
/// decoded packets never carry it, so `decode(encode(p)) == p` holds for all
/// caller-constructed packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet type tag.
    pub packet_type: PacketType,
    /// Flag bitset (compression excluded, see above).
    pub flags: PacketFlags,
    /// Sender clock at send time, microseconds since the Unix epoch. Used
    /// for jitter diagnostics, never for ordering.
    pub timestamp_us: u64,
    /// Opaque payload bytes; semantics depend on `packet_type`.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a packet stamped with the current time.
    pub fn new(packet_type: PacketType, payload: Vec<u8>) -> Self {
        Self {
            packet_type,
            flags: PacketFlags::NONE,
            timestamp_us: now_micros(),
            payload,
        }
    }

    /// Create a packet with an explicit timestamp.
    pub fn with_timestamp(packet_type: PacketType, payload: Vec<u8>, timestamp_us: u64) -> Self {
        Self {
            packet_type,
            flags: PacketFlags::NONE,
            timestamp_us,
            payload,
        }
    }

    /// An empty keepalive probe.
    pub fn ping() -> Self {
        Self::new(PacketType::Ping, Vec::new())
    }

    /// An empty keepalive answer.
    pub fn pong() -> Self {
        Self::new(PacketType::Pong, Vec::new())
    }

    /// An empty clean-disconnect notification.
    pub fn goodbye() -> Self {
        Self::new(PacketType::Goodbye, Vec::new())
    }
}

/// Microseconds since the Unix epoch.
pub(crate) fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_roundtrip() {
        for t in [
            PacketType::HandshakeInit,
            PacketType::HandshakeResp,
            PacketType::HandshakeFin,
            PacketType::Capability,
            PacketType::AsciiFrame,
            PacketType::PixelFrame,
            PacketType::AudioFrame,
            PacketType::Ping,
            PacketType::Pong,
            PacketType::ServerState,
            PacketType::Goodbye,
        ] {
            assert_eq!(PacketType::from_u16(t.as_u16()), Some(t));
        }
        assert_eq!(PacketType::from_u16(0), None);
        assert_eq!(PacketType::from_u16(999), None);
    }

    #[test]
    fn test_handshake_classification() {
        assert!(PacketType::HandshakeInit.is_handshake());
        assert!(PacketType::HandshakeFin.is_handshake());
        assert!(!PacketType::Capability.is_handshake());
        assert!(!PacketType::Ping.is_handshake());
    }

    #[test]
    fn test_media_classification() {
        assert!(PacketType::AsciiFrame.is_media());
        assert!(PacketType::AudioFrame.is_media());
        assert!(!PacketType::Capability.is_media());
        assert!(!PacketType::Goodbye.is_media());
    }

    #[test]
    fn test_flags() {
        let flags = PacketFlags::NONE;
        assert!(!flags.is_compressed());
        assert!(flags.is_valid());

        let flags = flags.with_compressed().with_last_fragment();
        assert!(flags.is_compressed());
        assert!(flags.is_last_fragment());
        assert!(flags.is_valid());

        assert!(!flags.without_compressed().is_compressed());

        // Reserved bits invalid
        assert!(!PacketFlags::from_u16(0x0004).is_valid());
    }
}
