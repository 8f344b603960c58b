//! Handshake state machine
//!
//! [`PairingHandler`] holds the protocol logic without doing any I/O: it
//! consumes notifications and returns the frame, if any, that has to be
//! written in response. [`HandshakeSession`](super::HandshakeSession) wraps
//! it with a [`DeviceLink`](crate::DeviceLink).
//!
//! ## Message Flow
//!
//! ```text
//! phone                                  safety module
//!   | -- 01 00 (activate) ------------------> |
//!   | -- 01 08 + key ----------------------> |
//!   | <------------------------ EAEB (key ok) |
//!   | -- 02 00 (request challenge) --------> |
//!   | <--------------- 10 02 01 + nonce (16) |
//!   | -- 03 00 + AES(key, nonce) ----------> |
//!   | <-------------------------- EAMB (ok)   |
//! ```
//!
//! `EAEC` (not confirmed on the device) and `EAME` (device error) end the
//! handshake at any point.

use super::state::{FailureReason, SessionState};
use crate::cipher::PreSharedKey;
use crate::codec::{commands, Frame};
use crate::link::Notification;
use crate::status::StatusCode;
use crate::{PairingError, Result};
use tracing::{debug, info, warn};

/// Result of feeding one event into the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    /// Frame to write in response
    pub reply: Option<Frame>,
}

impl Transition {
    fn stay(state: SessionState) -> Self {
        Self {
            from: state,
            to: state,
            reply: None,
        }
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Pure handshake logic for one device
#[derive(Debug)]
pub struct PairingHandler {
    key: PreSharedKey,
    state: SessionState,
    last_error: Option<String>,
    link_errors: u32,
    max_link_errors: u32,
}

impl PairingHandler {
    /// Create a handler
    ///
    /// `max_link_errors` consecutive notification errors fail the handshake;
    /// 0 tolerates any number.
    pub fn new(key: PreSharedKey, max_link_errors: u32) -> Self {
        Self {
            key,
            state: SessionState::Idle,
            last_error: None,
            link_errors: 0,
            max_link_errors,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Begin the handshake
    ///
    /// Returns the activation frame followed by the key announcement.
    pub fn start(&mut self) -> Result<[Frame; 2]> {
        if self.state != SessionState::Idle {
            return Err(PairingError::AlreadyStarted);
        }

        let announce = Frame::new(commands::SEND_KEY, self.key.as_bytes())?;
        self.state = SessionState::AwaitingHello;
        info!("Starting handshake");

        Ok([Frame::command_only(commands::ACTIVATE), announce])
    }

    /// Process one notification
    pub fn handle_notification(&mut self, notification: &Notification) -> Transition {
        match self.state {
            SessionState::Idle => {
                warn!("Ignoring notification before the handshake started");
                return Transition::stay(self.state);
            }
            state if state.is_terminal() => {
                debug!("Ignoring notification in terminal state {}", state);
                return Transition::stay(state);
            }
            _ => {}
        }

        match notification {
            Notification::Value(value) => self.handle_value(value),
            Notification::Error(message) => self.handle_link_error(message),
        }
    }

    /// Force a terminal failure (timeouts, dropped links, fatal writes)
    ///
    /// Has no effect once the handshake is over.
    pub fn fail(&mut self, reason: FailureReason) -> Transition {
        if self.state.is_terminal() {
            return Transition::stay(self.state);
        }
        self.move_to(SessionState::Failed(reason), None)
    }

    /// Remember an error that did not change state
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    fn handle_value(&mut self, value: &str) -> Transition {
        self.link_errors = 0;

        let status = match StatusCode::decode(value) {
            Ok(status) => status,
            Err(e) => {
                warn!("Could not read device challenge: {}", e);
                self.record_error(e.to_string());
                return self.move_to(SessionState::Failed(FailureReason::AuthenticateError), None);
            }
        };

        match status {
            StatusCode::ConfirmationDenied => {
                info!("Pairing was not confirmed on the device");
                self.move_to(SessionState::Failed(FailureReason::ConfirmationDenied), None)
            }
            StatusCode::DeviceError => {
                warn!("Device reported an error");
                self.move_to(SessionState::Failed(FailureReason::UnknownDeviceError), None)
            }
            StatusCode::Authenticated => {
                info!("Device authenticated");
                self.move_to(SessionState::Authenticated, None)
            }
            StatusCode::KeyRequested => {
                debug!("Device accepted our key, requesting challenge");
                self.move_to(
                    SessionState::AwaitingKeyRequestOrChallenge,
                    Some(Frame::command_only(commands::REQUEST_KEY)),
                )
            }
            StatusCode::Challenge(nonce) => match self.answer_challenge(&nonce) {
                Ok(frame) => {
                    debug!("Answering device challenge");
                    self.move_to(SessionState::AwaitingFinalAck, Some(frame))
                }
                Err(e) => {
                    warn!("Failed to answer device challenge: {}", e);
                    self.record_error(e.to_string());
                    self.move_to(SessionState::Failed(FailureReason::AuthenticateError), None)
                }
            },
        }
    }

    fn handle_link_error(&mut self, message: &str) -> Transition {
        self.link_errors += 1;
        self.record_error(message);
        warn!(
            "Notification error ({} in a row): {}",
            self.link_errors, message
        );

        if self.max_link_errors > 0 && self.link_errors >= self.max_link_errors {
            return self.move_to(SessionState::Failed(FailureReason::LinkError), None);
        }

        Transition::stay(self.state)
    }

    fn answer_challenge(&self, nonce: &[u8]) -> Result<Frame> {
        let ciphertext = self.key.encrypt(nonce)?;
        Frame::new(commands::SEND_ENCRYPTED, &ciphertext)
    }

    fn move_to(&mut self, to: SessionState, reply: Option<Frame>) -> Transition {
        let from = self.state;
        self.state = to;
        if from != to {
            debug!("Handshake state {} -> {}", from, to);
        }
        Transition { from, to, reply }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    const NONCE_NOTIFICATION: &str = "EAIBAAECAwQFBgcICQoLDA0ODw==";

    fn started() -> PairingHandler {
        let mut handler = PairingHandler::new(PreSharedKey::DEFAULT, 3);
        handler.start().unwrap();
        handler
    }

    fn value(v: &str) -> Notification {
        Notification::value(v)
    }

    #[test]
    fn test_start_frames() {
        let mut handler = PairingHandler::new(PreSharedKey::DEFAULT, 3);
        let [activate, announce] = handler.start().unwrap();

        assert_eq!(activate.command(), commands::ACTIVATE);
        assert!(!activate.has_data());
        assert_eq!(announce.command(), commands::SEND_KEY);
        assert_eq!(announce.payload(), PreSharedKey::DEFAULT.as_bytes());
        assert_eq!(handler.state(), SessionState::AwaitingHello);
    }

    #[test]
    fn test_start_twice() {
        let mut handler = started();
        assert_eq!(handler.start().unwrap_err(), PairingError::AlreadyStarted);
        assert_eq!(handler.state(), SessionState::AwaitingHello);
    }

    #[test]
    fn test_key_requested() {
        let mut handler = started();
        let transition = handler.handle_notification(&value("EAEB"));

        assert_eq!(transition.to, SessionState::AwaitingKeyRequestOrChallenge);
        let reply = transition.reply.unwrap();
        assert_eq!(reply.command(), commands::REQUEST_KEY);
    }

    #[test]
    fn test_challenge_answered_with_ciphertext() {
        let mut handler = started();
        handler.handle_notification(&value("EAEB"));
        let transition = handler.handle_notification(&value(NONCE_NOTIFICATION));

        assert_eq!(transition.to, SessionState::AwaitingFinalAck);
        let reply = transition.reply.unwrap();
        assert_eq!(reply.command(), commands::SEND_ENCRYPTED);

        let nonce = codec::decode_nonce(NONCE_NOTIFICATION).unwrap();
        let expected = PreSharedKey::DEFAULT.encrypt(&nonce).unwrap();
        assert_eq!(reply.payload(), &expected);
    }

    #[test]
    fn test_full_success_flow() {
        let mut handler = started();
        handler.handle_notification(&value("EAEB"));
        handler.handle_notification(&value(NONCE_NOTIFICATION));
        let transition = handler.handle_notification(&value("EAMB"));

        assert_eq!(transition.from, SessionState::AwaitingFinalAck);
        assert_eq!(transition.to, SessionState::Authenticated);
        assert!(transition.reply.is_none());
    }

    #[test]
    fn test_authenticated_from_any_waiting_state() {
        for prefix in [vec![], vec!["EAEB"], vec!["EAEB", NONCE_NOTIFICATION]] {
            let mut handler = started();
            for v in prefix {
                handler.handle_notification(&value(v));
            }
            let transition = handler.handle_notification(&value("EAMB"));
            assert_eq!(transition.to, SessionState::Authenticated);
            assert!(transition.reply.is_none());
        }
    }

    #[test]
    fn test_confirmation_denied() {
        let mut handler = started();
        let transition = handler.handle_notification(&value("EAEC"));
        assert_eq!(
            transition.to,
            SessionState::Failed(FailureReason::ConfirmationDenied)
        );
    }

    #[test]
    fn test_device_error() {
        let mut handler = started();
        handler.handle_notification(&value("EAEB"));
        let transition = handler.handle_notification(&value("EAME"));
        assert_eq!(
            transition.to,
            SessionState::Failed(FailureReason::UnknownDeviceError)
        );
    }

    #[test]
    fn test_malformed_nonce_fails_without_reply() {
        let mut handler = started();
        let transition = handler.handle_notification(&value("EAIBAAECAwQFBgc="));

        assert_eq!(
            transition.to,
            SessionState::Failed(FailureReason::AuthenticateError)
        );
        assert!(transition.reply.is_none());
        assert!(handler.last_error().unwrap().contains("16 bytes"));
    }

    #[test]
    fn test_terminal_state_ignores_notifications() {
        let mut handler = started();
        handler.handle_notification(&value("EAMB"));
        let transition = handler.handle_notification(&value("EAEB"));

        assert!(!transition.changed());
        assert!(transition.reply.is_none());
        assert_eq!(handler.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_idle_ignores_notifications() {
        let mut handler = PairingHandler::new(PreSharedKey::DEFAULT, 3);
        let transition = handler.handle_notification(&value("EAMB"));
        assert_eq!(transition.to, SessionState::Idle);
    }

    #[test]
    fn test_link_errors_threshold() {
        let mut handler = started();
        handler.handle_notification(&Notification::error("gatt 133"));
        handler.handle_notification(&Notification::error("gatt 133"));
        assert_eq!(handler.state(), SessionState::AwaitingHello);
        assert_eq!(handler.last_error(), Some("gatt 133"));

        let transition = handler.handle_notification(&Notification::error("gatt 133"));
        assert_eq!(transition.to, SessionState::Failed(FailureReason::LinkError));
    }

    #[test]
    fn test_value_resets_link_error_count() {
        let mut handler = started();
        handler.handle_notification(&Notification::error("a"));
        handler.handle_notification(&Notification::error("b"));
        handler.handle_notification(&value("EAEB"));
        handler.handle_notification(&Notification::error("c"));
        handler.handle_notification(&Notification::error("d"));

        assert_eq!(handler.state(), SessionState::AwaitingKeyRequestOrChallenge);
    }

    #[test]
    fn test_unlimited_link_errors() {
        let mut handler = PairingHandler::new(PreSharedKey::DEFAULT, 0);
        handler.start().unwrap();
        for _ in 0..50 {
            handler.handle_notification(&Notification::error("noise"));
        }
        assert_eq!(handler.state(), SessionState::AwaitingHello);
    }

    #[test]
    fn test_fail_is_noop_when_terminal() {
        let mut handler = started();
        handler.handle_notification(&value("EAMB"));
        let transition = handler.fail(FailureReason::Timeout);
        assert_eq!(transition.to, SessionState::Authenticated);

        let mut handler = started();
        let transition = handler.fail(FailureReason::Timeout);
        assert_eq!(transition.to, SessionState::Failed(FailureReason::Timeout));
    }
}
