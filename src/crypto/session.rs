//! Session AEAD with counter nonces.
//!
//! Each direction of a session gets its own key and its own 64-bit counter.
//! The counter rides the wire next to the ciphertext and doubles as the
//! nonce and the associated data, so reordering or replaying a sealed frame
//! fails authentication. The receive side additionally insists on strictly
//! increasing counters; any regression means desync or tampering and is
//! fatal to the session.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroize;

use crate::core::{CryptoError, AEAD_NONCE_SIZE, SESSION_KEY_SIZE};

use super::handshake::{Role, SessionKeys};

/// A single directional 32-byte session key, zeroized on drop.
pub struct SessionKey {
    bytes: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Wrap raw key material.
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

fn nonce_from_counter(counter: u64) -> XNonce {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    nonce[..8].copy_from_slice(&counter.to_be_bytes());
    *XNonce::from_slice(&nonce)
}

/// Outbound half: seals plaintext under the send key.
pub struct Sealer {
    cipher: XChaCha20Poly1305,
    counter: u64,
}

impl Sealer {
    /// Create a sealer from a directional key.
    pub fn new(key: &SessionKey) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            counter: 0,
        }
    }

    /// Seal a plaintext, returning the counter used and the ciphertext.
    ///
    /// Counters never repeat under a key; the session must be torn down and
    /// re-handshaken long before 2^64 frames.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<(u64, Vec<u8>), CryptoError> {
        let counter = self.counter;
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or(CryptoError::EncryptionFailed)?;

        let ciphertext = self
            .cipher
            .encrypt(
                &nonce_from_counter(counter),
                Payload {
                    msg: plaintext,
                    aad: &counter.to_be_bytes(),
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok((counter, ciphertext))
    }
}

/// Inbound half: opens ciphertext under the receive key.
pub struct Opener {
    cipher: XChaCha20Poly1305,
    last_counter: Option<u64>,
}

impl Opener {
    /// Create an opener from a directional key.
    pub fn new(key: &SessionKey) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            last_counter: None,
        }
    }

    /// Open a sealed frame. The counter must be strictly greater than any
    /// previously accepted counter.
    pub fn open(&mut self, counter: u64, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if let Some(last) = self.last_counter {
            if counter <= last {
                return Err(CryptoError::NonceRegression { got: counter, last });
            }
        }

        let plaintext = self
            .cipher
            .decrypt(
                &nonce_from_counter(counter),
                Payload {
                    msg: ciphertext,
                    aad: &counter.to_be_bytes(),
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;

        self.last_counter = Some(counter);
        Ok(plaintext)
    }
}

/// Split derived session keys into this role's sealer and opener.
pub fn session_channels(keys: &SessionKeys, role: Role) -> (Sealer, Opener) {
    (
        Sealer::new(keys.send_key(role)),
        Opener::new(keys.recv_key(role)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_pair() -> (SessionKey, SessionKey) {
        (
            SessionKey::from_bytes([0x11; SESSION_KEY_SIZE]),
            SessionKey::from_bytes([0x11; SESSION_KEY_SIZE]),
        )
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (k1, k2) = key_pair();
        let mut sealer = Sealer::new(&k1);
        let mut opener = Opener::new(&k2);

        for i in 0..5u8 {
            let msg = vec![i; 100];
            let (counter, sealed) = sealer.seal(&msg).unwrap();
            assert_eq!(counter, i as u64);
            assert_eq!(opener.open(counter, &sealed).unwrap(), msg);
        }
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (k1, k2) = key_pair();
        let mut sealer = Sealer::new(&k1);
        let mut opener = Opener::new(&k2);

        let (counter, mut sealed) = sealer.seal(b"frame").unwrap();
        sealed[0] ^= 0x01;
        assert!(matches!(
            opener.open(counter, &sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_counter_replay_rejected() {
        let (k1, k2) = key_pair();
        let mut sealer = Sealer::new(&k1);
        let mut opener = Opener::new(&k2);

        let (c0, s0) = sealer.seal(b"a").unwrap();
        let (c1, s1) = sealer.seal(b"b").unwrap();
        opener.open(c0, &s0).unwrap();
        opener.open(c1, &s1).unwrap();

        // Replaying an already-accepted counter fails before decryption
        assert!(matches!(
            opener.open(c0, &s0),
            Err(CryptoError::NonceRegression { .. })
        ));
    }

    #[test]
    fn test_wrong_counter_fails_auth() {
        let (k1, k2) = key_pair();
        let mut sealer = Sealer::new(&k1);
        let mut opener = Opener::new(&k2);

        let (counter, sealed) = sealer.seal(b"frame").unwrap();
        assert!(opener.open(counter + 1, &sealed).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let k1 = SessionKey::from_bytes([0x11; SESSION_KEY_SIZE]);
        let k2 = SessionKey::from_bytes([0x22; SESSION_KEY_SIZE]);
        let mut sealer = Sealer::new(&k1);
        let mut opener = Opener::new(&k2);

        let (counter, sealed) = sealer.seal(b"frame").unwrap();
        assert!(opener.open(counter, &sealed).is_err());
    }
}
