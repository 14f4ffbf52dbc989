//! Session History Loader
//!
//! Restores the prior transcript once per login, before the connection is
//! opened, so the welcome message is only shown for genuinely new
//! conversations. A failed fetch is logged and leaves the transcript empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::ApiError;
use crate::messages::{MessageId, MessageRole};
use crate::protocol::Usage;
use crate::session::{ChatMessage, MessageKind, MessageLog, ToolResult};

/// One message as stored server-side
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Message identifier
    pub id: String,
    /// Who sent it
    pub role: MessageRole,
    /// Content
    #[serde(default)]
    pub content: String,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Presentation kind (`chat`, `nudge`, `interrupted`); unknown values
    /// are shown as chat
    #[serde(default)]
    pub kind: Option<String>,
    /// Token accounting
    #[serde(default)]
    pub usage: Option<Usage>,
    /// Tool outputs
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
}

impl HistoryRecord {
    /// Project into a finished transcript entry
    #[must_use]
    pub fn into_message(self) -> ChatMessage {
        let kind = match self.kind.as_deref() {
            Some("nudge") => MessageKind::Nudge,
            Some("interrupted") => MessageKind::Interrupted,
            _ => MessageKind::Chat,
        };
        let mut msg = ChatMessage::new(self.role, self.content).with_id(MessageId(self.id));
        if let Some(created_at) = self.created_at {
            msg.created_at = created_at;
        }
        msg.kind = kind;
        msg.usage = self.usage;
        msg.tool_results = self.tool_results;
        msg
    }
}

/// Once-per-login history restoration
#[derive(Debug, Default)]
pub struct SessionHistoryLoader {
    requested: bool,
}

impl SessionHistoryLoader {
    /// Loader that has not fetched yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the fetch for this login; `false` if it was already claimed
    pub fn begin(&mut self) -> bool {
        if self.requested {
            return false;
        }
        self.requested = true;
        true
    }

    /// Allow another fetch (new login)
    pub fn reset(&mut self) {
        self.requested = false;
    }

    /// Replace the transcript with the fetched history
    ///
    /// Returns the number of restored messages; failures restore nothing.
    pub fn apply(
        messages: &mut MessageLog,
        result: Result<Vec<HistoryRecord>, ApiError>,
    ) -> usize {
        match result {
            Ok(records) => {
                let restored: Vec<ChatMessage> =
                    records.into_iter().map(HistoryRecord::into_message).collect();
                let count = restored.len();
                messages.replace(restored);
                info!(count, "Restored conversation history");
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to load conversation history");
                0
            }
        }
    }
}
