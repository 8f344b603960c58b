//! Session Event System
//!
//! Events emitted while a handshake runs, for UIs and logs.

use super::state::{PairingOutcome, SessionState};
use crate::codec::Command;

/// Events emitted by a handshake session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// `start()` ran and the first frames were handed to the link
    Started {
        /// Peer identifier reported by the link
        peer: String,
    },

    /// The state machine moved
    StateChanged {
        from: SessionState,
        to: SessionState,
    },

    /// A frame was written successfully
    FrameSent {
        /// Opcode of the frame
        command: Command,
    },

    /// A frame could not be written
    WriteFailed {
        /// Opcode of the frame
        command: Command,
        /// Error reported by the link
        message: String,
    },

    /// The link delivered an error instead of a value
    LinkError {
        /// Error reported by the link
        message: String,
    },

    /// The session reached a terminal state
    Completed {
        outcome: PairingOutcome,
    },
}

impl SessionEvent {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionEvent::Completed { .. })
    }

    /// Opcode for frame related events
    pub fn command(&self) -> Option<Command> {
        match self {
            SessionEvent::FrameSent { command } => Some(*command),
            SessionEvent::WriteFailed { command, .. } => Some(*command),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::commands;

    #[test]
    fn test_event_helpers() {
        let sent = SessionEvent::FrameSent {
            command: commands::SEND_KEY,
        };
        assert_eq!(sent.command(), Some([0x01, 0x08]));
        assert!(!sent.is_completed());

        let done = SessionEvent::Completed {
            outcome: PairingOutcome::Authenticated,
        };
        assert!(done.is_completed());
        assert_eq!(done.command(), None);
    }
}
