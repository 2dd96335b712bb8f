//! Packet encode/decode.
//!
//! Checksum is CRC32 over the payload as transmitted (after compression,
//! before encryption); zero-length payloads carry checksum 0. Decoding
//! verifies the checksum only after any decompression has succeeded, so a
//! broken compression stage surfaces as its own error instead of being
//! masked by a checksum pass on garbage.

use std::sync::Arc;

use crate::buffer::{BufferPool, PooledBuf};
use crate::core::{
    FramingError, DEFAULT_COMPRESSION_LEVEL, MAX_PAYLOAD_SIZE, MIN_COMPRESS_SIZE, PACKET_HEADER_SIZE,
    PACKET_MAGIC,
};
use crate::protocol::{Packet, PacketFlags, PacketType};

/// Converts between [`Packet`] values and their canonical wire bytes.
///
/// One codec instance is shared per connection; it carries the negotiated
/// compression setting and the buffer pool encode draws from.
#[derive(Clone)]
pub struct PacketCodec {
    pool: Arc<BufferPool>,
    compression: bool,
    max_payload: usize,
}

impl PacketCodec {
    /// Codec with compression enabled, drawing from `pool`.
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            compression: true,
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }

    /// Enable or disable payload compression (negotiated per connection).
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Override the maximum accepted payload size.
    pub fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max;
        self
    }

    /// Encode a packet into a single contiguous pooled buffer.
    ///
    /// Payloads at or above the compression threshold are zstd-compressed
    /// when that actually shrinks them; the compressed flag is set on the
    /// wire and stripped again by [`decode`](Self::decode).
    pub fn encode(&self, packet: &Packet) -> Result<PooledBuf, FramingError> {
        let mut flags = packet.flags;
        let mut compressed: Option<Vec<u8>> = None;

        if self.compression && packet.payload.len() >= MIN_COMPRESS_SIZE {
            let candidate = zstd::encode_all(&packet.payload[..], DEFAULT_COMPRESSION_LEVEL)
                .map_err(|e| FramingError::Decompress(e.to_string()))?;
            if candidate.len() < packet.payload.len() {
                flags = flags.with_compressed();
                compressed = Some(candidate);
            }
        }

        let payload: &[u8] = compressed.as_deref().unwrap_or(&packet.payload);
        if payload.len() > self.max_payload {
            return Err(FramingError::PayloadTooLarge {
                declared: payload.len(),
                max: self.max_payload,
            });
        }

        let checksum = if payload.is_empty() {
            0
        } else {
            crc32(payload)
        };

        let mut buf = self.pool.acquire();
        buf.reserve(PACKET_HEADER_SIZE + payload.len());
        buf.extend_from_slice(&PACKET_MAGIC.to_be_bytes());
        buf.extend_from_slice(&packet.packet_type.as_u16().to_be_bytes());
        buf.extend_from_slice(&flags.as_u16().to_be_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&checksum.to_be_bytes());
        buf.extend_from_slice(&packet.timestamp_us.to_be_bytes());
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Decode one packet from the front of `bytes`.
    ///
    /// Returns the packet and the number of bytes consumed, so a buffer
    /// holding several frames can be drained by repeated calls. Yields
    /// [`FramingError::IncompleteFrame`] when more bytes are needed; every
    /// other error means the stream is corrupt.
    pub fn decode(&self, bytes: &[u8]) -> Result<(Packet, usize), FramingError> {
        if bytes.len() < PACKET_HEADER_SIZE {
            return Err(FramingError::IncompleteFrame);
        }

        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != PACKET_MAGIC {
            return Err(FramingError::BadMagic(magic));
        }

        let type_tag = u16::from_be_bytes([bytes[4], bytes[5]]);
        let packet_type =
            PacketType::from_u16(type_tag).ok_or(FramingError::InvalidType(type_tag))?;

        let raw_flags = u16::from_be_bytes([bytes[6], bytes[7]]);
        let flags = PacketFlags::from_u16(raw_flags);
        if !flags.is_valid() {
            return Err(FramingError::MalformedFlags(raw_flags));
        }

        let length = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        if length > self.max_payload {
            return Err(FramingError::PayloadTooLarge {
                declared: length,
                max: self.max_payload,
            });
        }
        if length == 0 && flags.is_compressed() {
            return Err(FramingError::EmptyCompressedPayload);
        }

        let expected_crc = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let timestamp_us = u64::from_be_bytes([
            bytes[16], bytes[17], bytes[18], bytes[19], bytes[20], bytes[21], bytes[22], bytes[23],
        ]);

        let total = PACKET_HEADER_SIZE + length;
        if bytes.len() < total {
            return Err(FramingError::IncompleteFrame);
        }

        let wire_payload = &bytes[PACKET_HEADER_SIZE..total];

        let payload = if flags.is_compressed() {
            decompress_bounded(wire_payload, self.max_payload)?
        } else {
            wire_payload.to_vec()
        };

        // Integrity check runs after decompression succeeded; the CRC itself
        // still covers the wire bytes.
        let actual_crc = if wire_payload.is_empty() {
            0
        } else {
            crc32(wire_payload)
        };
        if actual_crc != expected_crc {
            return Err(FramingError::ChecksumMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        Ok((
            Packet {
                packet_type,
                flags: flags.without_compressed(),
                timestamp_us,
                payload,
            },
            total,
        ))
    }
}

/// Decompress with a hard cap on output size.
///
/// The size a zstd frame claims it decompresses to is attacker-controlled,
/// so the stream is read through a limit instead of materialized in one
/// call. Output past `max` stops the read and fails the frame; at most
/// `max + 1` bytes are ever buffered.
pub(crate) fn decompress_bounded(compressed: &[u8], max: usize) -> Result<Vec<u8>, FramingError> {
    use std::io::Read;

    let decoder = zstd::stream::read::Decoder::new(compressed)
        .map_err(|e| FramingError::Decompress(e.to_string()))?;
    let mut out = Vec::new();
    decoder
        .take(max as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| FramingError::Decompress(e.to_string()))?;
    if out.len() > max {
        return Err(FramingError::PayloadTooLarge {
            declared: out.len(),
            max,
        });
    }
    Ok(out)
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PacketCodec {
        PacketCodec::new(BufferPool::new(4, 1024))
    }

    #[test]
    fn test_roundtrip() {
        let codec = codec();
        let packet = Packet::with_timestamp(PacketType::Capability, vec![1, 2, 3, 4, 5], 42);

        let wire = codec.encode(&packet).unwrap();
        let (decoded, consumed) = codec.decode(&wire).unwrap();

        assert_eq!(decoded, packet);
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn test_roundtrip_zero_length() {
        let codec = codec();
        let packet = Packet::with_timestamp(PacketType::Ping, Vec::new(), 7);

        let wire = codec.encode(&packet).unwrap();
        assert_eq!(wire.len(), PACKET_HEADER_SIZE);

        let (decoded, consumed) = codec.decode(&wire).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(consumed, PACKET_HEADER_SIZE);
    }

    #[test]
    fn test_roundtrip_compressed() {
        let codec = codec();
        // Highly compressible payload above the threshold
        let packet = Packet::with_timestamp(PacketType::AsciiFrame, vec![b'@'; 4096], 1);

        let wire = codec.encode(&packet).unwrap();
        assert!(wire.len() < PACKET_HEADER_SIZE + 4096);

        let raw_flags = u16::from_be_bytes([wire[6], wire[7]]);
        assert!(PacketFlags::from_u16(raw_flags).is_compressed());

        let (decoded, _) = codec.decode(&wire).unwrap();
        // Decoded packet is transparent: original payload, no compressed flag
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_incompressible_stays_raw() {
        let codec = codec();
        let payload: Vec<u8> = (0..MIN_COMPRESS_SIZE).map(|i| (i * 131) as u8).collect();
        let packet = Packet::with_timestamp(PacketType::PixelFrame, payload.clone(), 1);

        let wire = codec.encode(&packet).unwrap();
        let (decoded, _) = codec.decode(&wire).unwrap();
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn test_checksum_detects_any_flip() {
        let codec = codec();
        let packet = Packet::with_timestamp(PacketType::AudioFrame, vec![9u8; 32], 3);
        let wire = codec.encode(&packet).unwrap();

        for i in PACKET_HEADER_SIZE..wire.len() {
            let mut corrupted = wire.to_vec();
            corrupted[i] ^= 0x01;
            assert!(
                matches!(
                    codec.decode(&corrupted),
                    Err(FramingError::ChecksumMismatch { .. })
                ),
                "flip at byte {i} not detected"
            );
        }
    }

    #[test]
    fn test_corrupted_compressed_payload_always_fatal() {
        let codec = codec();
        let packet = Packet::with_timestamp(PacketType::AsciiFrame, vec![b'#'; 4096], 5);
        let wire = codec.encode(&packet).unwrap();

        let raw_flags = u16::from_be_bytes([wire[6], wire[7]]);
        assert!(PacketFlags::from_u16(raw_flags).is_compressed());

        // Depending on where the flip lands it surfaces as a zstd error, a
        // checksum mismatch, or an impossible decompressed size; it must
        // never decode cleanly.
        for i in PACKET_HEADER_SIZE..wire.len() {
            let mut corrupted = wire.to_vec();
            corrupted[i] ^= 0x01;
            let result = codec.decode(&corrupted);
            assert!(
                matches!(
                    result,
                    Err(FramingError::Decompress(_))
                        | Err(FramingError::ChecksumMismatch { .. })
                        | Err(FramingError::PayloadTooLarge { .. })
                ),
                "flip at byte {i} not fatal: {result:?}"
            );
        }
    }

    #[test]
    fn test_compressed_bomb_rejected_without_materializing() {
        let codec = codec();
        // A few KB on the wire claiming to decompress far past the limit
        let original = vec![0u8; 4 * MAX_PAYLOAD_SIZE];
        let compressed = zstd::encode_all(&original[..], DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert!(compressed.len() < MAX_PAYLOAD_SIZE);

        let mut wire = Vec::with_capacity(PACKET_HEADER_SIZE + compressed.len());
        wire.extend_from_slice(&PACKET_MAGIC.to_be_bytes());
        wire.extend_from_slice(&PacketType::AsciiFrame.as_u16().to_be_bytes());
        wire.extend_from_slice(&PacketFlags::COMPRESSED.as_u16().to_be_bytes());
        wire.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        wire.extend_from_slice(&crc32(&compressed).to_be_bytes());
        wire.extend_from_slice(&0u64.to_be_bytes());
        wire.extend_from_slice(&compressed);

        match codec.decode(&wire) {
            Err(FramingError::PayloadTooLarge { declared, max }) => {
                assert_eq!(max, MAX_PAYLOAD_SIZE);
                // The limit fired during streaming, not after a full expand
                assert!(declared < original.len());
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_header_is_incomplete() {
        let codec = codec();
        let packet = Packet::with_timestamp(PacketType::Ping, Vec::new(), 0);
        let wire = codec.encode(&packet).unwrap();

        for cut in 0..PACKET_HEADER_SIZE {
            assert_eq!(
                codec.decode(&wire[..cut]),
                Err(FramingError::IncompleteFrame)
            );
        }
    }

    #[test]
    fn test_partial_payload_is_incomplete() {
        let codec = codec();
        let packet = Packet::with_timestamp(PacketType::Capability, vec![1; 64], 0);
        let wire = codec.encode(&packet).unwrap();

        // Complete header, truncated payload
        let cut = PACKET_HEADER_SIZE + 10;
        assert_eq!(
            codec.decode(&wire[..cut]),
            Err(FramingError::IncompleteFrame)
        );
    }

    #[test]
    fn test_bad_magic() {
        let codec = codec();
        let packet = Packet::with_timestamp(PacketType::Ping, Vec::new(), 0);
        let mut wire = codec.encode(&packet).unwrap().into_vec();
        wire[0] = 0x00;

        assert!(matches!(
            codec.decode(&wire),
            Err(FramingError::BadMagic(_))
        ));
    }

    #[test]
    fn test_invalid_type() {
        let codec = codec();
        let packet = Packet::with_timestamp(PacketType::Ping, Vec::new(), 0);
        let mut wire = codec.encode(&packet).unwrap().into_vec();
        wire[4] = 0xFF;
        wire[5] = 0xFF;

        assert_eq!(codec.decode(&wire), Err(FramingError::InvalidType(0xFFFF)));
    }

    #[test]
    fn test_declared_length_too_large() {
        let codec = PacketCodec::new(BufferPool::new(4, 1024)).with_max_payload(128);
        let packet = Packet::with_timestamp(PacketType::Ping, Vec::new(), 0);
        let mut wire = codec.encode(&packet).unwrap().into_vec();
        wire[8..12].copy_from_slice(&1_000_000u32.to_be_bytes());

        assert!(matches!(
            codec.decode(&wire),
            Err(FramingError::PayloadTooLarge { declared: 1_000_000, .. })
        ));
    }

    #[test]
    fn test_zero_length_with_compressed_flag_rejected() {
        let codec = codec();
        let packet = Packet::with_timestamp(PacketType::Ping, Vec::new(), 0);
        let mut wire = codec.encode(&packet).unwrap().into_vec();
        // Force the compressed flag on an empty payload
        wire[6..8].copy_from_slice(&PacketFlags::COMPRESSED.as_u16().to_be_bytes());

        assert_eq!(
            codec.decode(&wire),
            Err(FramingError::EmptyCompressedPayload)
        );
    }

    #[test]
    fn test_two_packets_in_one_buffer() {
        let codec = codec();
        let a = Packet::with_timestamp(PacketType::Ping, Vec::new(), 1);
        let b = Packet::with_timestamp(PacketType::Pong, Vec::new(), 2);

        let mut stream = codec.encode(&a).unwrap().into_vec();
        stream.extend_from_slice(&codec.encode(&b).unwrap());

        let (first, used) = codec.decode(&stream).unwrap();
        assert_eq!(first, a);
        let (second, _) = codec.decode(&stream[used..]).unwrap();
        assert_eq!(second, b);
    }
}
