//! Session lifecycle state machine.

use crate::core::{PhaseTag, TermcastError};

/// Phase of a connection's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No connection.
    #[default]
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Noise handshake running over the established socket.
    Handshaking,
    /// Encrypted application traffic flowing.
    Connected,
    /// Terminal failure; only disconnect leaves this phase.
    Error,
}

impl SessionPhase {
    fn tag(self) -> PhaseTag {
        match self {
            Self::Disconnected => PhaseTag::Disconnected,
            Self::Connecting => PhaseTag::Connecting,
            Self::Handshaking => PhaseTag::Handshaking,
            Self::Connected => PhaseTag::Connected,
            Self::Error => PhaseTag::Error,
        }
    }
}

/// Tracks the current phase and rejects illegal transitions.
#[derive(Debug, Default)]
pub struct SessionState {
    phase: SessionPhase,
}

impl SessionState {
    /// Start in `Disconnected`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Attempt a transition.
    ///
    /// Legal moves are the forward chain Disconnected -> Connecting ->
    /// Handshaking -> Connected, a fall to `Error` from any live phase, and
    /// `Disconnected` from anywhere.
    pub fn transition(&mut self, to: SessionPhase) -> Result<(), TermcastError> {
        use SessionPhase::*;
        let legal = matches!(
            (self.phase, to),
            (Disconnected, Connecting)
                | (Connecting, Handshaking)
                | (Handshaking, Connected)
                | (Connecting, Error)
                | (Handshaking, Error)
                | (Connected, Error)
                | (_, Disconnected)
        );
        if !legal {
            return Err(TermcastError::InvalidTransition {
                from: self.phase.tag(),
                to: to.tag(),
            });
        }
        self.phase = to;
        Ok(())
    }
}
