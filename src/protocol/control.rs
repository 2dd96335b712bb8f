//! Server state announcement payload.

use crate::core::FramingError;

const WIRE_SIZE: usize = 12;

/// Periodic server-side session summary, broadcast to all clients.
///
/// Wire layout (big-endian): `connected_clients u32 | active_streams u32 |
/// reserved u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerState {
    /// Clients currently past the handshake.
    pub connected_clients: u32,
    /// Clients currently sending media.
    pub active_streams: u32,
}

impl ServerState {
    /// Encode to the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WIRE_SIZE);
        buf.extend_from_slice(&self.connected_clients.to_be_bytes());
        buf.extend_from_slice(&self.active_streams.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf
    }

    /// Decode from the wire layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < WIRE_SIZE {
            return Err(FramingError::MalformedPayload(format!(
                "server state record too short: {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            connected_clients: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            active_streams: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}
