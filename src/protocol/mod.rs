//! Packet framing and payload codecs.
//!
//! Wire layout of every packet (all multi-byte integers big-endian):
//!
//! ```text
//! +-------+------+-------+--------+----------+-----------+---------+
//! | Magic | Type | Flags | Length | Checksum | Timestamp | Payload |
//! | u32   | u16  | u16   | u32    | u32      | u64 (us)  | bytes   |
//! +-------+------+-------+--------+----------+-----------+---------+
//! ```
//!
//! The checksum is CRC32 over the payload exactly as it appears on the wire
//! (post-compression, pre-encryption). Structured payloads (capability, media
//! frame, audio batch, server state) have their own fixed layouts in the
//! submodules here.

mod capability;
mod codec;
mod control;
mod media;
mod packet;

pub use capability::{
    TerminalCapability, CAPABILITY_WIRE_SIZE, CAP_AUDIO, CAP_COLOR, CAP_STRETCH, CAP_VIDEO,
};
pub use codec::PacketCodec;
pub use control::ServerState;
pub use media::{AudioBatch, MediaFrame, MEDIA_HEADER_SIZE};
pub use packet::{Packet, PacketFlags, PacketType};
