//! Session Commands
//!
//! Requests from a UI surface to the session client. Commands are queued on
//! the client's command channel and handled one at a time by its event loop.

use crate::api::Credentials;
use crate::snapshot::Location;

/// Request from a UI surface
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    // ============================================
    // Lifecycle
    // ============================================
    /// Start a session: restore history, then connect
    ///
    /// Logging in again replaces the current session.
    Login(Credentials),

    /// End the session and forget the credentials
    Logout,

    /// Stop the client event loop
    Shutdown,

    // ============================================
    // Conversation
    // ============================================
    /// Send a user message; refused while disconnected or mid-response
    SendText(String),

    /// Ask the server to stop the in-flight response
    Stop,

    /// Dismiss a nudge
    DismissNudge {
        /// Nudge identifier
        nudge_id: String,
        /// Suppress it permanently
        permanent: bool,
    },

    /// Approve a pending tool action
    Approve {
        /// Confirmation identifier
        confirm_id: String,
    },

    // ============================================
    // Context
    // ============================================
    /// The user moved to another route
    Navigate(Location),

    /// The chat panel was opened or closed
    SetPanelOpen(bool),
}

impl SessionCommand {
    /// Command name for logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login(_) => "login",
            Self::Logout => "logout",
            Self::Shutdown => "shutdown",
            Self::SendText(_) => "send_text",
            Self::Stop => "stop",
            Self::DismissNudge { .. } => "dismiss_nudge",
            Self::Approve { .. } => "approve",
            Self::Navigate(_) => "navigate",
            Self::SetPanelOpen(_) => "set_panel_open",
        }
    }
}
