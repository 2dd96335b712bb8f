//! Peer trust store.
//!
//! Identities learned during the handshake are checked here before a session
//! is admitted. The store is shared across connections, so pinning under
//! trust-on-first-use protects every later connection from the same process.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::core::CryptoError;

use super::keys::PeerId;

/// What to do with a peer identity that is not pinned yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    /// Unknown peers are rejected. The default.
    #[default]
    FailClosed,
    /// Unknown peers are pinned on first contact and accepted.
    TrustOnFirstUse,
}

/// Set of trusted peer identities plus the policy for unknown ones.
pub struct TrustStore {
    pinned: Mutex<HashSet<PeerId>>,
    policy: TrustPolicy,
}

impl TrustStore {
    /// Empty store with the given policy.
    pub fn new(policy: TrustPolicy) -> Self {
        Self {
            pinned: Mutex::new(HashSet::new()),
            policy,
        }
    }

    /// Empty fail-closed store.
    pub fn fail_closed() -> Self {
        Self::new(TrustPolicy::FailClosed)
    }

    /// Empty trust-on-first-use store.
    pub fn trust_on_first_use() -> Self {
        Self::new(TrustPolicy::TrustOnFirstUse)
    }

    /// Pin a peer explicitly, ahead of any connection.
    pub fn pin(&self, peer: PeerId) {
        self.pinned.lock().insert(peer);
    }

    /// True if the peer is already pinned.
    pub fn is_pinned(&self, peer: &PeerId) -> bool {
        self.pinned.lock().contains(peer)
    }

    /// Judge a peer identity learned from a handshake.
    ///
    /// Pinned peers pass. Unknown peers pass and are pinned under
    /// `TrustOnFirstUse`, or fail with [`CryptoError::UnknownPeer`] under
    /// `FailClosed`.
    pub fn verify_or_pin(&self, peer: &PeerId) -> Result<(), CryptoError> {
        let mut pinned = self.pinned.lock();
        if pinned.contains(peer) {
            return Ok(());
        }
        match self.policy {
            TrustPolicy::TrustOnFirstUse => {
                info!(peer = %peer, "pinning new peer identity");
                pinned.insert(*peer);
                Ok(())
            }
            TrustPolicy::FailClosed => {
                warn!(peer = %peer, "rejecting unknown peer identity");
                Err(CryptoError::UnknownPeer(peer.to_string()))
            }
        }
    }

    /// Number of pinned identities.
    pub fn len(&self) -> usize {
        self.pinned.lock().len()
    }

    /// True when nothing is pinned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
