//! Session configuration
//!
//! Settings that decide the open policy questions of the handshake: how short
//! commands go on the wire, whether write failures are fatal, and how long a
//! session may wait for the device.

use crate::codec::FrameLayout;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Consecutive link errors tolerated before a session fails
pub const DEFAULT_MAX_LINK_ERRORS: u32 = 3;

/// What a failed characteristic write does to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteFailurePolicy {
    /// Publish a `WriteFailed` event and keep waiting for the device
    #[default]
    Report,
    /// Fail the session with `link_error`
    Fail,
}

/// Handshake session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wire layout for payload-less commands
    pub frame_layout: FrameLayout,

    /// Reaction to write failures
    pub write_failure: WriteFailurePolicy,

    /// Consecutive notification errors before failing (0 = never)
    pub max_link_errors: u32,

    /// Per-state deadline in seconds, enforced by `HandshakeSession::run`
    pub state_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_layout: FrameLayout::default(),
            write_failure: WriteFailurePolicy::default(),
            max_link_errors: DEFAULT_MAX_LINK_ERRORS,
            state_timeout_secs: None,
        }
    }
}

impl SessionConfig {
    pub fn state_timeout(&self) -> Option<Duration> {
        self.state_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_state_timeout(mut self, timeout: Duration) -> Self {
        self.state_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_write_failure(mut self, policy: WriteFailurePolicy) -> Self {
        self.write_failure = policy;
        self
    }

    pub fn with_frame_layout(mut self, layout: FrameLayout) -> Self {
        self.frame_layout = layout;
        self
    }

    pub fn with_max_link_errors(mut self, max: u32) -> Self {
        self.max_link_errors = max;
        self
    }
}
