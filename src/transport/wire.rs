//! Outer wire frame encoding and TCP stream reassembly.

use crate::core::{
    FramingError, MAX_WIRE_FRAME_SIZE, WIRE_KIND_PLAIN, WIRE_KIND_SEALED, WIRE_PREFIX_SIZE,
};

/// One complete frame pulled off the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// Plaintext body, legal only during the handshake.
    Plain(Vec<u8>),
    /// Sealed body with its nonce counter.
    Sealed {
        /// Nonce counter the body was sealed under.
        nonce: u64,
        /// AEAD ciphertext of an encoded packet.
        ciphertext: Vec<u8>,
    },
}

impl WireFrame {
    /// Encode a plaintext frame.
    pub fn encode_plain(body: &[u8]) -> Vec<u8> {
        let len = 1 + body.len();
        let mut out = Vec::with_capacity(WIRE_PREFIX_SIZE + body.len());
        out.extend_from_slice(&(len as u32).to_be_bytes());
        out.push(WIRE_KIND_PLAIN);
        out.extend_from_slice(body);
        out
    }

    /// Encode a sealed frame.
    pub fn encode_sealed(nonce: u64, ciphertext: &[u8]) -> Vec<u8> {
        let len = 1 + 8 + ciphertext.len();
        let mut out = Vec::with_capacity(WIRE_PREFIX_SIZE + 8 + ciphertext.len());
        out.extend_from_slice(&(len as u32).to_be_bytes());
        out.push(WIRE_KIND_SEALED);
        out.extend_from_slice(&nonce.to_be_bytes());
        out.extend_from_slice(ciphertext);
        out
    }
}

/// Reassembles wire frames from raw TCP reads.
///
/// A single read may carry zero, one, several, or a fraction of a frame;
/// `feed` buffers bytes and `next_frame` yields frames as they complete.
/// Oversized declared lengths are rejected before any buffering of the body.
#[derive(Debug, Default)]
pub struct WireAssembler {
    buf: Vec<u8>,
}

impl WireAssembler {
    /// Empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the socket.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pull the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<WireFrame>, FramingError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len == 0 {
            return Err(FramingError::MalformedPayload("empty wire frame".into()));
        }
        if len > MAX_WIRE_FRAME_SIZE {
            return Err(FramingError::PayloadTooLarge {
                declared: len,
                max: MAX_WIRE_FRAME_SIZE,
            });
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }

        let frame_bytes: Vec<u8> = self.buf.drain(..4 + len).skip(4).collect();
        let kind = frame_bytes[0];
        let body = &frame_bytes[1..];

        match kind {
            WIRE_KIND_PLAIN => Ok(Some(WireFrame::Plain(body.to_vec()))),
            WIRE_KIND_SEALED => {
                if body.len() < 8 {
                    return Err(FramingError::MalformedPayload(
                        "sealed wire frame shorter than its nonce".into(),
                    ));
                }
                let nonce = u64::from_be_bytes([
                    body[0], body[1], body[2], body[3], body[4], body[5], body[6], body[7],
                ]);
                Ok(Some(WireFrame::Sealed {
                    nonce,
                    ciphertext: body[8..].to_vec(),
                }))
            }
            other => Err(FramingError::MalformedPayload(format!(
                "unknown wire frame kind {other}"
            ))),
        }
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
