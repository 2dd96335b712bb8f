//! Noise_XX handshake.
//!
//! ```text
//! Noise_XX(s, rs):
//!   -> e                    # ephemeral only, nothing identifying
//!   <- e, ee, s, es         # server reveals its static, encrypted
//!   -> s, se                # client reveals its static, encrypted
//! ```
//!
//! XX is used instead of a pre-shared-key pattern because neither side knows
//! the other's identity in advance: static keys travel inside the handshake
//! and are judged by the trust store once learned. After the third message
//! both sides derive directional session keys from the handshake hash.

use snow::{Builder, HandshakeState};
use zeroize::Zeroize;

use crate::core::{CryptoError, HASH_SIZE, PROTOCOL_VERSION, PUBLIC_KEY_SIZE, SESSION_KEY_SIZE};

use super::keys::{IdentityKeypair, PeerId};
use super::session::SessionKey;

pub(crate) const NOISE_PATTERN: &str = "Noise_XX_25519_ChaChaPoly_BLAKE2s";

const MSG_BUF_SIZE: usize = 1024;

/// Output of a completed handshake.
pub struct HandshakeResult {
    /// Transcript hash binding both identities and all handshake messages.
    pub handshake_hash: [u8; HASH_SIZE],
}

fn remote_identity(state: &HandshakeState) -> Result<PeerId, CryptoError> {
    let remote = state
        .get_remote_static()
        .ok_or_else(|| CryptoError::HandshakeFailed("no remote static key".into()))?;
    let mut bytes = [0u8; PUBLIC_KEY_SIZE];
    bytes.copy_from_slice(remote);
    Ok(PeerId::from_bytes(bytes))
}

/// Client side of the handshake.
pub struct InitiatorHandshake {
    state: HandshakeState,
}

impl InitiatorHandshake {
    /// Create the initiator state from the local identity.
    pub fn new(local: &IdentityKeypair) -> Result<Self, CryptoError> {
        let builder = Builder::new(
            NOISE_PATTERN
                .parse()
                .map_err(|_| CryptoError::KeyDerivationFailed)?,
        );
        let state = builder
            .local_private_key(local.private_key())
            .build_initiator()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        Ok(Self { state })
    }

    /// Produce message 1 (`-> e`), carrying the protocol version.
    pub fn write_initial(&mut self) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; MSG_BUF_SIZE];
        let len = self
            .state
            .write_message(&PROTOCOL_VERSION.to_be_bytes(), &mut buf)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Consume message 2 (`<- e, ee, s, es`) and learn the server identity.
    pub fn read_response(&mut self, message: &[u8]) -> Result<PeerId, CryptoError> {
        let mut payload = vec![0u8; MSG_BUF_SIZE];
        self.state
            .read_message(message, &mut payload)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        remote_identity(&self.state)
    }

    /// Produce message 3 (`-> s, se`) and finish the handshake.
    pub fn write_final(mut self) -> Result<(Vec<u8>, HandshakeResult), CryptoError> {
        let mut buf = vec![0u8; MSG_BUF_SIZE];
        let len = self
            .state
            .write_message(&[], &mut buf)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        buf.truncate(len);

        // Hash must be taken before transitioning out of handshake state
        let mut handshake_hash = [0u8; HASH_SIZE];
        handshake_hash.copy_from_slice(self.state.get_handshake_hash());

        // Transition verifies the handshake actually completed
        let _transport = self
            .state
            .into_transport_mode()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;

        Ok((buf, HandshakeResult { handshake_hash }))
    }
}

/// Server side of the handshake.
pub struct ResponderHandshake {
    state: HandshakeState,
}

impl ResponderHandshake {
    /// Create the responder state from the local identity.
    pub fn new(local: &IdentityKeypair) -> Result<Self, CryptoError> {
        let builder = Builder::new(
            NOISE_PATTERN
                .parse()
                .map_err(|_| CryptoError::KeyDerivationFailed)?,
        );
        let state = builder
            .local_private_key(local.private_key())
            .build_responder()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        Ok(Self { state })
    }

    /// Consume message 1 (`-> e`) and check the protocol version.
    ///
    /// The version rides unencrypted in the first message; it is still bound
    /// into the transcript hash, so a downgrade attempt breaks the handshake.
    pub fn read_initial(&mut self, message: &[u8]) -> Result<(), CryptoError> {
        let mut payload = vec![0u8; MSG_BUF_SIZE];
        let len = self
            .state
            .read_message(message, &mut payload)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        if len != 2 {
            return Err(CryptoError::HandshakeFailed(
                "missing protocol version".into(),
            ));
        }
        let version = u16::from_be_bytes([payload[0], payload[1]]);
        if version != PROTOCOL_VERSION {
            return Err(CryptoError::HandshakeFailed(format!(
                "unsupported protocol version {version}"
            )));
        }
        Ok(())
    }

    /// Produce message 2 (`<- e, ee, s, es`).
    pub fn write_response(&mut self) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; MSG_BUF_SIZE];
        let len = self
            .state
            .write_message(&[], &mut buf)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Consume message 3 (`-> s, se`), learn the client identity, and finish.
    pub fn read_final(mut self, message: &[u8]) -> Result<(PeerId, HandshakeResult), CryptoError> {
        let mut payload = vec![0u8; MSG_BUF_SIZE];
        self.state
            .read_message(message, &mut payload)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;

        let peer = remote_identity(&self.state)?;

        let mut handshake_hash = [0u8; HASH_SIZE];
        handshake_hash.copy_from_slice(self.state.get_handshake_hash());

        let _transport = self
            .state
            .into_transport_mode()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;

        Ok((peer, HandshakeResult { handshake_hash }))
    }
}

/// Role in the handshake. Determines which directional key sends and which
/// receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The connecting client.
    Initiator,
    /// The accepting server.
    Responder,
}

/// Directional session keys derived from the handshake hash.
///
/// ```text
/// (initiator_key, responder_key) = HKDF-Expand(
///     handshake_hash,
///     "termcast v1 session keys",
///     64
/// )
/// ```
pub struct SessionKeys {
    /// Seals initiator-to-responder traffic.
    pub initiator_key: SessionKey,
    /// Seals responder-to-initiator traffic.
    pub responder_key: SessionKey,
}

impl SessionKeys {
    /// Derive both directional keys from a completed handshake.
    pub fn derive(result: &HandshakeResult) -> Result<Self, CryptoError> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::from_prk(&result.handshake_hash)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;
        let mut key_material = [0u8; SESSION_KEY_SIZE * 2];
        hk.expand(b"termcast v1 session keys", &mut key_material)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        let mut initiator_key = [0u8; SESSION_KEY_SIZE];
        let mut responder_key = [0u8; SESSION_KEY_SIZE];
        initiator_key.copy_from_slice(&key_material[..SESSION_KEY_SIZE]);
        responder_key.copy_from_slice(&key_material[SESSION_KEY_SIZE..]);
        key_material.zeroize();

        Ok(Self {
            initiator_key: SessionKey::from_bytes(initiator_key),
            responder_key: SessionKey::from_bytes(responder_key),
        })
    }

    /// The key this role seals outbound traffic with.
    pub fn send_key(&self, role: Role) -> &SessionKey {
        match role {
            Role::Initiator => &self.initiator_key,
            Role::Responder => &self.responder_key,
        }
    }

    /// The key this role opens inbound traffic with.
    pub fn recv_key(&self, role: Role) -> &SessionKey {
        match role {
            Role::Initiator => &self.responder_key,
            Role::Responder => &self.initiator_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_handshake() -> (PeerId, PeerId, HandshakeResult, HandshakeResult) {
        let client_kp = IdentityKeypair::generate().unwrap();
        let server_kp = IdentityKeypair::generate().unwrap();

        let mut initiator = InitiatorHandshake::new(&client_kp).unwrap();
        let mut responder = ResponderHandshake::new(&server_kp).unwrap();

        let msg1 = initiator.write_initial().unwrap();
        responder.read_initial(&msg1).unwrap();

        let msg2 = responder.write_response().unwrap();
        let server_id = initiator.read_response(&msg2).unwrap();
        assert_eq!(server_id.as_bytes(), server_kp.public_key());

        let (msg3, init_result) = initiator.write_final().unwrap();
        let (client_id, resp_result) = responder.read_final(&msg3).unwrap();
        assert_eq!(client_id.as_bytes(), client_kp.public_key());

        (client_id, server_id, init_result, resp_result)
    }

    #[test]
    fn test_handshake_roundtrip() {
        let (_, _, init_result, resp_result) = run_handshake();
        assert_eq!(init_result.handshake_hash, resp_result.handshake_hash);
    }

    #[test]
    fn test_derived_keys_match_across_roles() {
        let (_, _, init_result, resp_result) = run_handshake();

        let client_keys = SessionKeys::derive(&init_result).unwrap();
        let server_keys = SessionKeys::derive(&resp_result).unwrap();

        assert_eq!(
            client_keys.send_key(Role::Initiator).as_bytes(),
            server_keys.recv_key(Role::Responder).as_bytes()
        );
        assert_eq!(
            client_keys.recv_key(Role::Initiator).as_bytes(),
            server_keys.send_key(Role::Responder).as_bytes()
        );
        assert_ne!(
            client_keys.initiator_key.as_bytes(),
            client_keys.responder_key.as_bytes()
        );
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let client_kp = IdentityKeypair::generate().unwrap();
        let server_kp = IdentityKeypair::generate().unwrap();

        // A raw initiator announcing a version we do not speak
        let mut raw = Builder::new(NOISE_PATTERN.parse().unwrap())
            .local_private_key(client_kp.private_key())
            .build_initiator()
            .unwrap();
        let mut msg1 = vec![0u8; MSG_BUF_SIZE];
        let len = raw.write_message(&99u16.to_be_bytes(), &mut msg1).unwrap();
        msg1.truncate(len);

        let mut responder = ResponderHandshake::new(&server_kp).unwrap();
        assert!(responder.read_initial(&msg1).is_err());
    }

    #[test]
    fn test_tampered_final_message_fails() {
        let client_kp = IdentityKeypair::generate().unwrap();
        let server_kp = IdentityKeypair::generate().unwrap();

        let mut initiator = InitiatorHandshake::new(&client_kp).unwrap();
        let mut responder = ResponderHandshake::new(&server_kp).unwrap();

        let msg1 = initiator.write_initial().unwrap();
        responder.read_initial(&msg1).unwrap();
        let msg2 = responder.write_response().unwrap();
        initiator.read_response(&msg2).unwrap();

        let (mut msg3, _) = initiator.write_final().unwrap();
        msg3[0] ^= 0xFF;
        assert!(responder.read_final(&msg3).is_err());
    }
}
