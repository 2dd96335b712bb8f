//! Session state machine, wire frame assembly, and framed socket I/O.
//!
//! Every packet crosses the socket inside an outer wire frame:
//!
//! ```text
//! +--------+------+-------------+------+
//! | Length | Kind | Nonce (u64) | Body |
//! | u32    | u8   | sealed only | ...  |
//! +--------+------+-------------+------+
//! ```
//!
//! Kind 0 carries a plaintext handshake packet; kind 1 carries sealed
//! ciphertext of an encoded packet. Plaintext frames are only legal during
//! the handshake. After it, [`PacketSender`] and [`PacketReceiver`] seal and
//! open everything with the session keys.

mod link;
mod state;
mod wire;

pub use link::{
    client_handshake, server_handshake, FrameReader, FrameWriter, PacketReceiver, PacketSender,
};
pub use state::{SessionPhase, SessionState};
pub use wire::{WireAssembler, WireFrame};
