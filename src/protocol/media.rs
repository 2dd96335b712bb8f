//! Media frame and audio batch payloads.
//!
//! The protocol core treats frame contents as opaque bytes; these headers
//! carry the metadata the render/audio collaborators need. The media-frame
//! checksum covers the *original* data and is verified after decompression,
//! so a broken codec round-trip is caught here rather than rendered.

use crate::core::{FramingError, DEFAULT_COMPRESSION_LEVEL, MAX_PAYLOAD_SIZE, MIN_COMPRESS_SIZE};

use super::codec::decompress_bounded;

/// Media frame header size on the wire.
pub const MEDIA_HEADER_SIZE: usize = 4 * 6 + 8;

/// A video/text-art frame in either direction.
///
/// Wire layout (big-endian), followed by the frame data:
/// ```text
/// width u32 | height u32 | format u32 | original_size u32 |
/// compressed_size u32 (0 = raw) | checksum u32 | timestamp_ms u64
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// Width in characters (text frames) or pixels (image frames).
    pub width: u32,
    /// Height in characters or pixels.
    pub height: u32,
    /// Pixel/encoding format tag, opaque to the protocol core.
    pub format: u32,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Raw frame data (uncompressed).
    pub data: Vec<u8>,
}

impl MediaFrame {
    /// Encode header + data, compressing the data when that helps.
    pub fn encode(&self) -> Result<Vec<u8>, FramingError> {
        let mut compressed: Option<Vec<u8>> = None;
        if self.data.len() >= MIN_COMPRESS_SIZE {
            let candidate = zstd::encode_all(&self.data[..], DEFAULT_COMPRESSION_LEVEL)
                .map_err(|e| FramingError::Decompress(e.to_string()))?;
            if candidate.len() < self.data.len() {
                compressed = Some(candidate);
            }
        }

        let body: &[u8] = compressed.as_deref().unwrap_or(&self.data);
        let compressed_size = if compressed.is_some() {
            body.len() as u32
        } else {
            0
        };

        let mut buf = Vec::with_capacity(MEDIA_HEADER_SIZE + body.len());
        buf.extend_from_slice(&self.width.to_be_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.format.to_be_bytes());
        buf.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&compressed_size.to_be_bytes());
        buf.extend_from_slice(&crc32(&self.data).to_be_bytes());
        buf.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        buf.extend_from_slice(body);
        Ok(buf)
    }

    /// Decode header + data, decompressing and verifying the checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < MEDIA_HEADER_SIZE {
            return Err(FramingError::MalformedPayload(
                "media frame shorter than header".into(),
            ));
        }

        let width = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let height = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let format = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let original_size =
            u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
        let compressed_size =
            u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]) as usize;
        let checksum = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        let timestamp_ms = u64::from_be_bytes([
            bytes[24], bytes[25], bytes[26], bytes[27], bytes[28], bytes[29], bytes[30], bytes[31],
        ]);

        if original_size > MAX_PAYLOAD_SIZE {
            return Err(FramingError::PayloadTooLarge {
                declared: original_size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let body = &bytes[MEDIA_HEADER_SIZE..];
        let data = if compressed_size > 0 {
            if body.len() != compressed_size {
                return Err(FramingError::MalformedPayload(format!(
                    "media frame body {} bytes, header declares {} compressed",
                    body.len(),
                    compressed_size
                )));
            }
            // The declared original size caps decompression; a stream that
            // expands past it fails without the excess being buffered.
            let data = decompress_bounded(body, original_size)?;
            if data.len() != original_size {
                return Err(FramingError::MalformedPayload(format!(
                    "decompressed to {} bytes, header declares {}",
                    data.len(),
                    original_size
                )));
            }
            data
        } else {
            if body.len() != original_size {
                return Err(FramingError::MalformedPayload(format!(
                    "media frame body {} bytes, header declares {}",
                    body.len(),
                    original_size
                )));
            }
            body.to_vec()
        };

        let actual = crc32(&data);
        if actual != checksum {
            return Err(FramingError::ChecksumMismatch {
                expected: checksum,
                actual,
            });
        }

        Ok(Self {
            width,
            height,
            format,
            timestamp_ms,
            data,
        })
    }
}

/// Batched audio samples.
///
/// Wire layout (big-endian): `batch_count u32 | total_samples u32 |
/// sample_rate u32 | channels u32`, followed by `total_samples` f32 samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBatch {
    /// Number of capture chunks folded into this batch.
    pub batch_count: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (1 = mono, 2 = stereo).
    pub channels: u32,
    /// Interleaved samples.
    pub samples: Vec<f32>,
}

impl AudioBatch {
    const HEADER_SIZE: usize = 16;

    /// Encode to the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEADER_SIZE + self.samples.len() * 4);
        buf.extend_from_slice(&self.batch_count.to_be_bytes());
        buf.extend_from_slice(&(self.samples.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.sample_rate.to_be_bytes());
        buf.extend_from_slice(&self.channels.to_be_bytes());
        for sample in &self.samples {
            buf.extend_from_slice(&sample.to_bits().to_be_bytes());
        }
        buf
    }

    /// Decode from the wire layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(FramingError::MalformedPayload(
                "audio batch shorter than header".into(),
            ));
        }
        let batch_count = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let total_samples = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let sample_rate = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let channels = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

        let body = &bytes[Self::HEADER_SIZE..];
        if body.len() != total_samples * 4 {
            return Err(FramingError::MalformedPayload(format!(
                "audio batch body {} bytes, header declares {} samples",
                body.len(),
                total_samples
            )));
        }

        let samples = body
            .chunks_exact(4)
            .map(|c| f32::from_bits(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect();

        Ok(Self {
            batch_count,
            sample_rate,
            channels,
            samples,
        })
    }
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
