//! Confirmation Gate
//!
//! Tools that need explicit approval send a `confirm_request`. The request is
//! attached to the streaming assistant message; the user can approve it with a
//! `confirm_action`, and the server later reports the outcome with a
//! `confirm_result` that is matched back by `confirm_id`.
//!
//! There is no denial frame: a request the user ignores simply stays pending.
//! The expiry window is advisory and only used for display.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::messages::MessageId;
use crate::protocol::ClientFrame;
use crate::session::{ChatMessage, MessageLog};

/// An action awaiting user approval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    /// Confirmation identifier
    pub confirm_id: String,
    /// Tool awaiting approval
    pub tool: String,
    /// Human-readable description
    pub description: String,
    /// Tool-specific details
    pub details: Value,
    /// Advisory validity window
    pub expires_in_seconds: u64,
    /// When the request arrived
    pub received_at: DateTime<Utc>,
}

impl ConfirmRequest {
    /// When the advisory window closes
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.expires_in_seconds).unwrap_or(i64::MAX);
        self.received_at
            .checked_add_signed(ChronoDuration::seconds(secs))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the advisory window has closed at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Outcome of an approved action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmResult {
    /// Confirmation identifier
    pub confirm_id: String,
    /// Whether the action succeeded
    pub success: bool,
    /// Outcome description
    pub message: String,
}

/// Attach, approve and resolve confirmation requests
pub struct ConfirmationGate;

impl ConfirmationGate {
    /// Attach a request to the streaming assistant message
    ///
    /// `in_flight` is the id of the response being streamed. When nothing is
    /// streaming, or the streaming message already carries a request, a new
    /// assistant entry is created to hold it. Existing requests are never
    /// replaced.
    pub fn attach(
        messages: &mut MessageLog,
        in_flight: Option<&MessageId>,
        request: ConfirmRequest,
    ) {
        let target = in_flight
            .and_then(|id| messages.streaming_mut(id))
            .filter(|m| m.confirm_request.is_none());
        if let Some(msg) = target {
            msg.tool_status = None;
            msg.confirm_request = Some(request);
            return;
        }
        debug!(confirm_id = %request.confirm_id, "Holding confirm_request in its own entry");
        let mut holder = ChatMessage::assistant(String::new());
        holder.confirm_request = Some(request);
        messages.push(holder);
    }

    /// Record the outcome on the message holding the matching request
    ///
    /// Returns `false` when no message carries `result.confirm_id`.
    pub fn resolve(messages: &mut MessageLog, result: ConfirmResult) -> bool {
        let confirm_id = result.confirm_id.clone();
        let target = messages.find_last_mut(|m| {
            m.confirm_request
                .as_ref()
                .is_some_and(|r| r.confirm_id == confirm_id)
        });
        match target {
            Some(msg) => {
                msg.confirm_result = Some(result);
                true
            }
            None => {
                debug!(confirm_id = %confirm_id, "confirm_result for unknown request ignored");
                false
            }
        }
    }

    /// Build the approval frame for a pending request
    ///
    /// Returns `None` if the id is unknown or already resolved.
    #[must_use]
    pub fn approve(messages: &MessageLog, confirm_id: &str) -> Option<ClientFrame> {
        let pending = messages.find_last(|m| {
            m.confirm_result.is_none()
                && m.confirm_request
                    .as_ref()
                    .is_some_and(|r| r.confirm_id == confirm_id)
        });
        pending.map(|_| ClientFrame::ConfirmAction {
            confirm_id: confirm_id.to_string(),
        })
    }

    /// Requests still awaiting a result
    #[must_use]
    pub fn pending(messages: &MessageLog) -> Vec<&ConfirmRequest> {
        messages
            .iter()
            .filter(|m| m.confirm_result.is_none())
            .filter_map(|m| m.confirm_request.as_ref())
            .collect()
    }
}
