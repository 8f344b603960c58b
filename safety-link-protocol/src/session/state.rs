//! Session states and outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a session ended without authenticating
///
/// The codes returned by [`FailureReason::code`] are stable and meant to be
/// matched on by whatever presents the result to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The user did not confirm pairing on the device
    ConfirmationDenied,
    /// The device reported an unspecified error
    UnknownDeviceError,
    /// The challenge could not be decoded or encrypted
    AuthenticateError,
    /// The link dropped, kept erroring, or writes failed
    LinkError,
    /// The device did not answer in time
    Timeout,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::ConfirmationDenied => "confirmation_denied",
            FailureReason::UnknownDeviceError => "unknown_device_error",
            FailureReason::AuthenticateError => "authenticate_error",
            FailureReason::LinkError => "link_error",
            FailureReason::Timeout => "timeout",
        }
    }

    /// Message for an alert dialog
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureReason::ConfirmationDenied => "User didn't confirm pairing on device",
            FailureReason::UnknownDeviceError => "Unknown error occurred",
            FailureReason::AuthenticateError => "Failed to authenticate device",
            FailureReason::LinkError => "Lost connection to the device",
            FailureReason::Timeout => "Device did not respond in time",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, nothing sent yet
    #[default]
    Idle,
    /// Activation and key sent, waiting for the first device response
    AwaitingHello,
    /// Asked for the device challenge
    AwaitingKeyRequestOrChallenge,
    /// Encrypted challenge sent, waiting for the verdict
    AwaitingFinalAck,
    /// Device accepted us
    Authenticated,
    /// Terminal failure
    Failed(FailureReason),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Failed(_))
    }

    /// The outcome, once the state is terminal
    pub fn outcome(&self) -> Option<PairingOutcome> {
        match self {
            SessionState::Authenticated => Some(PairingOutcome::Authenticated),
            SessionState::Failed(reason) => Some(PairingOutcome::Failed(*reason)),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::AwaitingHello => write!(f, "awaiting_hello"),
            SessionState::AwaitingKeyRequestOrChallenge => {
                write!(f, "awaiting_key_request_or_challenge")
            }
            SessionState::AwaitingFinalAck => write!(f, "awaiting_final_ack"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// Terminal result of a handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "reason")]
pub enum PairingOutcome {
    Authenticated,
    Failed(FailureReason),
}

impl PairingOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, PairingOutcome::Authenticated)
    }
}

impl fmt::Display for PairingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingOutcome::Authenticated => write!(f, "authenticated"),
            PairingOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
