//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket attached yet
    #[default]
    Unconnected,

    /// Socket open, peer address recorded
    Connected,

    /// Socket released
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Unconnected, Connected)
                // Replacing the socket of a connected candidate
                | (Connected, Connected)
                | (Closed, Connected)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether a socket is attached
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconnected => write!(f, "unconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
