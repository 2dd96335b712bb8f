//! X25519 identity key management.

use std::fmt;

use zeroize::Zeroize;

use crate::core::{CryptoError, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};

use super::handshake::NOISE_PATTERN;

/// A long-term X25519 identity keypair.
///
/// The private key is zeroized on drop.
#[derive(Clone)]
pub struct IdentityKeypair {
    private: [u8; PRIVATE_KEY_SIZE],
    public: [u8; PUBLIC_KEY_SIZE],
}

impl IdentityKeypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        let builder = snow::Builder::new(
            NOISE_PATTERN
                .parse()
                .map_err(|_| CryptoError::KeyDerivationFailed)?,
        );
        let keypair = builder
            .generate_keypair()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;

        let mut private = [0u8; PRIVATE_KEY_SIZE];
        let mut public = [0u8; PUBLIC_KEY_SIZE];
        private.copy_from_slice(&keypair.private);
        public.copy_from_slice(&keypair.public);

        Ok(Self { private, public })
    }

    /// Reconstruct a keypair from stored key material.
    pub fn from_bytes(private: [u8; PRIVATE_KEY_SIZE], public: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self { private, public }
    }

    /// The public identity.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public
    }

    /// The private key. Handle with care.
    pub(crate) fn private_key(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.private
    }

    /// This identity's peer ID.
    pub fn peer_id(&self) -> PeerId {
        PeerId(self.public)
    }
}

impl Drop for IdentityKeypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeypair")
            .field("public", &PeerId(self.public))
            .finish_non_exhaustive()
    }
}

/// A peer's identity, the raw X25519 static public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub(crate) [u8; PUBLIC_KEY_SIZE]);

impl PeerId {
    /// Wrap a raw public key.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// The raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}
