//! Identity keys, Noise handshake, session encryption, and peer trust.
//!
//! Trust model: each side has a long-term X25519 identity. The Noise_XX
//! handshake exchanges static keys in-band; after the exchange each side
//! checks the peer's identity against its [`TrustStore`]. Session traffic is
//! sealed with XChaCha20-Poly1305 under keys derived from the handshake
//! hash. There is no plaintext fallback.

mod handshake;
mod keys;
mod session;
mod trust;

pub use handshake::{
    HandshakeResult, InitiatorHandshake, ResponderHandshake, Role, SessionKeys,
};
pub use keys::{IdentityKeypair, PeerId};
pub use session::{session_channels, Opener, Sealer, SessionKey};
pub use trust::{TrustPolicy, TrustStore};
