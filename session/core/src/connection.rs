//! Connection Lifecycle
//!
//! Pure state machine for the persistent connection. It decides what a close
//! means (fatal or retryable), computes the reconnect backoff and tracks the
//! user-visible countdown. Timers and sockets live in the client actor; this
//! module only answers "what now?".
//!
//! ```text
//! Disconnected ──begin_connect──▶ Connecting ──on_open──▶ Connected
//!      ▲                              │                        │
//!      └──────────── on_close ────────┴────────────────────────┘
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Close code the transport reports when the connection dropped without a
/// close frame (also used for failed connection attempts)
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Shown when the server rejects the credentials
pub const AUTH_FAILED_MESSAGE: &str =
    "Your session has expired or is no longer authorized. Please sign in again.";

/// Shown when the same session was opened somewhere else
pub const SUPERSEDED_MESSAGE: &str =
    "This conversation was opened in another window or tab. Reload this one to continue here.";

/// Connection state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none in progress
    #[default]
    Disconnected,
    /// Attempt in flight
    Connecting,
    /// Handshake pending or complete; frames may be sent
    Connected,
}

impl ConnectionState {
    /// Human-readable state
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        }
    }

    /// Whether frames may be sent
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Observable connection status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current state
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful open
    pub reconnect_attempt: u32,
    /// Whole seconds until the next attempt, while one is scheduled
    pub countdown_secs: Option<u64>,
}

/// Close codes and backoff limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClosePolicy {
    /// Close code meaning the credentials were rejected
    pub auth_failure_code: u16,
    /// Close code meaning the session was taken over elsewhere
    pub superseded_code: u16,
    /// Upper bound on the reconnect delay
    pub max_backoff_secs: u64,
}

impl Default for ClosePolicy {
    fn default() -> Self {
        Self {
            auth_failure_code: 4001,
            superseded_code: 4002,
            max_backoff_secs: 30,
        }
    }
}

/// What to do after the connection closed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Credentials rejected; do not retry
    AuthFailed,
    /// Session opened elsewhere; do not retry
    Superseded,
    /// Retry after `delay`
    Retry {
        /// Delay before the next attempt
        delay: Duration,
        /// Attempt number the delay was computed for
        attempt: u32,
    },
}

impl CloseDisposition {
    /// Whether the close ends the session for good
    #[must_use]
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::Retry { .. })
    }
}

/// Reconnect delay for a given attempt: `min(max, 2^attempt)` seconds
#[must_use]
pub fn backoff_delay(attempt: u32, max_backoff_secs: u64) -> Duration {
    let exp = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(exp.min(max_backoff_secs))
}

/// Connection state machine
#[derive(Clone, Debug)]
pub struct ConnectionManager {
    status: ConnectionStatus,
    policy: ClosePolicy,
}

impl ConnectionManager {
    /// Create a disconnected manager
    #[must_use]
    pub fn new(policy: ClosePolicy) -> Self {
        Self {
            status: ConnectionStatus::default(),
            policy,
        }
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.state
    }

    /// Close policy in effect
    #[must_use]
    pub fn policy(&self) -> ClosePolicy {
        self.policy
    }

    /// Whether outbound frames may be sent
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.status.state == ConnectionState::Connected
    }

    /// Start an attempt
    ///
    /// Only valid from `Disconnected`. Returns `false` if an attempt is
    /// already in flight or the connection is open.
    pub fn begin_connect(&mut self) -> bool {
        if self.status.state != ConnectionState::Disconnected {
            return false;
        }
        self.status.state = ConnectionState::Connecting;
        self.status.countdown_secs = None;
        true
    }

    /// The connection opened
    pub fn on_open(&mut self) {
        self.status.state = ConnectionState::Connected;
        self.status.reconnect_attempt = 0;
        self.status.countdown_secs = None;
    }

    /// The connection closed (or an attempt failed) with `code`
    pub fn on_close(&mut self, code: u16) -> CloseDisposition {
        self.status.state = ConnectionState::Disconnected;

        if code == self.policy.auth_failure_code {
            self.status.countdown_secs = None;
            return CloseDisposition::AuthFailed;
        }
        if code == self.policy.superseded_code {
            self.status.countdown_secs = None;
            return CloseDisposition::Superseded;
        }

        let delay = backoff_delay(self.status.reconnect_attempt, self.policy.max_backoff_secs);
        let attempt = self.status.reconnect_attempt;
        self.status.reconnect_attempt = self.status.reconnect_attempt.saturating_add(1);
        self.status.countdown_secs = Some(delay.as_secs());
        CloseDisposition::Retry { delay, attempt }
    }

    /// One second of countdown elapsed
    ///
    /// Returns the remaining seconds; the value stays at zero until the
    /// scheduled attempt fires.
    pub fn tick_countdown(&mut self) -> Option<u64> {
        if let Some(secs) = self.status.countdown_secs.as_mut() {
            *secs = secs.saturating_sub(1);
        }
        self.status.countdown_secs
    }

    /// Drop back to `Disconnected` without scheduling anything
    pub fn reset(&mut self) {
        self.status.state = ConnectionState::Disconnected;
        self.status.countdown_secs = None;
    }
}
