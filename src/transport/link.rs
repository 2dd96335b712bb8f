//! Framed socket I/O and the in-band handshake drivers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::buffer::BufferPool;
use crate::core::{CryptoError, FramingError, TermcastError};
use crate::crypto::{
    session_channels, IdentityKeypair, InitiatorHandshake, Opener, PeerId, ResponderHandshake,
    Role, Sealer, SessionKeys, TrustStore,
};
use crate::protocol::{Packet, PacketCodec, PacketType};

use super::wire::{WireAssembler, WireFrame};

const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Reads complete wire frames off the socket's read half.
pub struct FrameReader {
    half: OwnedReadHalf,
    assembler: WireAssembler,
}

impl FrameReader {
    /// Wrap a read half.
    pub fn new(half: OwnedReadHalf) -> Self {
        Self {
            half,
            assembler: WireAssembler::new(),
        }
    }

    /// Read until one complete frame is available.
    pub async fn read_frame(&mut self) -> Result<WireFrame, TermcastError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = self.assembler.next_frame()? {
                return Ok(frame);
            }
            let n = self.half.read(&mut chunk).await?;
            if n == 0 {
                return Err(TermcastError::ConnectionClosed);
            }
            self.assembler.feed(&chunk[..n]);
        }
    }
}

/// Writes wire frames to the socket's write half.
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    /// Wrap a write half.
    pub fn new(half: OwnedWriteHalf) -> Self {
        Self { half }
    }

    /// Write a complete frame. Partial writes are retried by `write_all`.
    pub async fn write_frame(&mut self, bytes: &[u8]) -> Result<(), TermcastError> {
        self.half.write_all(bytes).await?;
        Ok(())
    }
}

/// Sealed, framed packet output for an established session.
pub struct PacketSender {
    writer: FrameWriter,
    sealer: Sealer,
    codec: PacketCodec,
    last_send: Instant,
}

impl PacketSender {
    fn new(writer: FrameWriter, sealer: Sealer, codec: PacketCodec) -> Self {
        Self {
            writer,
            sealer,
            codec,
            last_send: Instant::now(),
        }
    }

    /// Encode, seal, and write one packet.
    pub async fn send(&mut self, packet: &Packet) -> Result<(), TermcastError> {
        let encoded = self.codec.encode(packet)?;
        let (nonce, ciphertext) = self.sealer.seal(&encoded)?;
        self.writer
            .write_frame(&WireFrame::encode_sealed(nonce, &ciphertext))
            .await?;
        self.last_send = Instant::now();
        Ok(())
    }

    /// Time since the last successful send, for keepalive scheduling.
    pub fn idle(&self) -> Duration {
        self.last_send.elapsed()
    }
}

/// Opened, framed packet input for an established session.
pub struct PacketReceiver {
    reader: FrameReader,
    opener: Opener,
    codec: PacketCodec,
    last_recv: Instant,
}

impl PacketReceiver {
    fn new(reader: FrameReader, opener: Opener, codec: PacketCodec) -> Self {
        Self {
            reader,
            opener,
            codec,
            last_recv: Instant::now(),
        }
    }

    /// Read, open, and decode one packet.
    ///
    /// A plaintext frame here means the peer fell out of the encrypted
    /// channel; that is fatal, never ignored.
    pub async fn recv(&mut self) -> Result<Packet, TermcastError> {
        match self.reader.read_frame().await? {
            WireFrame::Sealed { nonce, ciphertext } => {
                let plain = self.opener.open(nonce, &ciphertext)?;
                let (packet, consumed) = self.codec.decode(&plain)?;
                if consumed != plain.len() {
                    return Err(FramingError::MalformedPayload(
                        "trailing bytes after sealed packet".into(),
                    )
                    .into());
                }
                self.last_recv = Instant::now();
                Ok(packet)
            }
            WireFrame::Plain(_) => Err(TermcastError::PlaintextAfterHandshake),
        }
    }

    /// Time since the last accepted packet, for dead-peer detection.
    pub fn idle(&self) -> Duration {
        self.last_recv.elapsed()
    }
}

async fn send_plain(
    writer: &mut FrameWriter,
    codec: &PacketCodec,
    packet_type: PacketType,
    payload: Vec<u8>,
) -> Result<(), TermcastError> {
    let encoded = codec.encode(&Packet::new(packet_type, payload))?;
    writer.write_frame(&WireFrame::encode_plain(&encoded)).await
}

async fn recv_plain(
    reader: &mut FrameReader,
    codec: &PacketCodec,
    expected: PacketType,
) -> Result<Vec<u8>, TermcastError> {
    match reader.read_frame().await? {
        WireFrame::Plain(body) => {
            let (packet, _) = codec.decode(&body)?;
            if packet.packet_type != expected {
                return Err(CryptoError::HandshakeFailed(format!(
                    "expected {:?}, got {:?}",
                    expected, packet.packet_type
                ))
                .into());
            }
            Ok(packet.payload)
        }
        WireFrame::Sealed { .. } => {
            Err(CryptoError::HandshakeFailed("sealed frame during handshake".into()).into())
        }
    }
}

/// Run the initiator handshake over a fresh connection.
///
/// On success the socket is split into a sealed sender/receiver pair bound
/// to the derived session keys, and the server's verified identity is
/// returned. On any failure the socket is dropped; no session key survives.
pub async fn client_handshake(
    stream: TcpStream,
    identity: &IdentityKeypair,
    trust: &TrustStore,
    pool: Arc<BufferPool>,
) -> Result<(PacketSender, PacketReceiver, PeerId), TermcastError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);
    let codec = PacketCodec::new(pool);

    let mut initiator = InitiatorHandshake::new(identity)?;

    let msg1 = initiator.write_initial()?;
    send_plain(&mut writer, &codec, PacketType::HandshakeInit, msg1).await?;

    let msg2 = recv_plain(&mut reader, &codec, PacketType::HandshakeResp).await?;
    let server_id = initiator.read_response(&msg2)?;
    trust.verify_or_pin(&server_id)?;

    let (msg3, result) = initiator.write_final()?;
    send_plain(&mut writer, &codec, PacketType::HandshakeFin, msg3).await?;

    let keys = SessionKeys::derive(&result)?;
    let (sealer, opener) = session_channels(&keys, Role::Initiator);
    debug!(server = %server_id, "handshake complete");

    Ok((
        PacketSender::new(writer, sealer, codec.clone()),
        PacketReceiver::new(reader, opener, codec),
        server_id,
    ))
}

/// Run the responder handshake over an accepted connection.
pub async fn server_handshake(
    stream: TcpStream,
    identity: &IdentityKeypair,
    trust: &TrustStore,
    pool: Arc<BufferPool>,
) -> Result<(PacketSender, PacketReceiver, PeerId), TermcastError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);
    let codec = PacketCodec::new(pool);

    let mut responder = ResponderHandshake::new(identity)?;

    let msg1 = recv_plain(&mut reader, &codec, PacketType::HandshakeInit).await?;
    responder.read_initial(&msg1)?;

    let msg2 = responder.write_response()?;
    send_plain(&mut writer, &codec, PacketType::HandshakeResp, msg2).await?;

    let msg3 = recv_plain(&mut reader, &codec, PacketType::HandshakeFin).await?;
    let (client_id, result) = responder.read_final(&msg3)?;
    trust.verify_or_pin(&client_id)?;

    let keys = SessionKeys::derive(&result)?;
    let (sealer, opener) = session_channels(&keys, Role::Responder);
    debug!(client = %client_id, "handshake complete");

    Ok((
        PacketSender::new(writer, sealer, codec.clone()),
        PacketReceiver::new(reader, opener, codec),
        client_id,
    ))
}
