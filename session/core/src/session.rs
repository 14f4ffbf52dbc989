//! Session State
//!
//! The single owner of all mutable client state: the transcript, the
//! connection status, the stream accumulator, the dataset cache and the
//! current location. Every component mutates state through a `&mut Session`
//! held by the client actor, so there is exactly one writer.
//!
//! # Transcript Invariant
//!
//! At most one message has `is_streaming == true`, and while one does it is
//! the last element of the transcript. [`MessageLog`] enforces this by
//! inserting any message added mid-stream just before the streaming one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::confirmation::{ConfirmRequest, ConfirmResult};
use crate::connection::ConnectionManager;
use crate::messages::{MessageId, MessageRole, SessionId};
use crate::protocol::Usage;
use crate::snapshot::{DatasetSummary, Location};
use crate::streaming::StreamAccumulator;

/// How a transcript entry should be presented
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary conversation turn
    #[default]
    Chat,
    /// Server-initiated hint
    Nudge,
    /// Partial assistant output preserved after a failed response
    Interrupted,
}

/// Nudge attributes kept alongside a nudge message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NudgeInfo {
    /// Nudge identifier
    pub nudge_id: String,
    /// Trigger reported by the server
    pub trigger: String,
    /// Whether the user may dismiss it
    pub dismissable: bool,
    /// Optional icon name
    pub icon: Option<String>,
    /// Set once the user dismissed it
    #[serde(default)]
    pub dismissed: bool,
}

/// Output of one tool invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool name
    pub tool: String,
    /// Tool-specific payload
    #[serde(default)]
    pub result: Value,
}

/// A transcript entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
    /// Whether the message is still receiving chunks
    pub is_streaming: bool,
    /// Token accounting, set when a stream finishes
    pub usage: Option<Usage>,
    /// Tool outputs delivered while this message was current
    pub tool_results: Vec<ToolResult>,
    /// Transient tool progress text
    pub tool_status: Option<String>,
    /// Pending action awaiting approval
    pub confirm_request: Option<ConfirmRequest>,
    /// Outcome of an approved action
    pub confirm_result: Option<ConfirmResult>,
    /// Presentation kind
    pub kind: MessageKind,
    /// Nudge attributes when `kind` is [`MessageKind::Nudge`]
    pub nudge: Option<NudgeInfo>,
}

impl ChatMessage {
    /// Create a new, finished message
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            is_streaming: false,
            usage: None,
            tool_results: Vec::new(),
            tool_status: None,
            confirm_request: None,
            confirm_result: None,
            kind: MessageKind::Chat,
            nudge: None,
        }
    }

    /// User turn
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Client-generated notice
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Finished assistant turn
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Empty assistant placeholder that will receive stream chunks
    #[must_use]
    pub fn streaming_placeholder() -> Self {
        let mut msg = Self::new(MessageRole::Assistant, String::new());
        msg.is_streaming = true;
        msg
    }

    /// Partial assistant output kept after a failed response
    #[must_use]
    pub fn interrupted(partial: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageRole::Assistant, partial);
        msg.kind = MessageKind::Interrupted;
        msg
    }

    /// Server nudge
    #[must_use]
    pub fn nudge(content: impl Into<String>, info: NudgeInfo) -> Self {
        let mut msg = Self::new(MessageRole::System, content);
        msg.kind = MessageKind::Nudge;
        msg.nudge = Some(info);
        msg
    }

    /// Override the generated id
    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }
}

/// Ordered transcript that keeps the streaming message last
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
}

impl MessageLog {
    /// Empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished message
    ///
    /// If a response is streaming, the message is placed just before it.
    pub fn push(&mut self, mut msg: ChatMessage) {
        msg.is_streaming = false;
        match self.messages.last() {
            Some(last) if last.is_streaming => {
                let at = self.messages.len() - 1;
                self.messages.insert(at, msg);
            }
            _ => self.messages.push(msg),
        }
    }

    /// Append a streaming placeholder
    ///
    /// Returns `false` (and leaves the log untouched) if another message is
    /// already streaming.
    pub fn push_streaming(&mut self, mut msg: ChatMessage) -> bool {
        if self.streaming().is_some() {
            return false;
        }
        msg.is_streaming = true;
        self.messages.push(msg);
        true
    }

    /// The streaming message, if any
    #[must_use]
    pub fn streaming(&self) -> Option<&ChatMessage> {
        self.messages.last().filter(|m| m.is_streaming)
    }

    /// Mutable access to the streaming message, if its id matches
    pub fn streaming_mut(&mut self, id: &MessageId) -> Option<&mut ChatMessage> {
        self.messages
            .last_mut()
            .filter(|m| m.is_streaming && &m.id == id)
    }

    /// Last message
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Mutable access to the last message
    pub fn last_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages.last_mut()
    }

    /// Most recent message matching `pred`
    pub fn find_last_mut<F>(&mut self, pred: F) -> Option<&mut ChatMessage>
    where
        F: Fn(&ChatMessage) -> bool,
    {
        self.messages.iter_mut().rev().find(|m| pred(m))
    }

    /// Most recent message matching `pred`
    pub fn find_last<F>(&self, pred: F) -> Option<&ChatMessage>
    where
        F: Fn(&ChatMessage) -> bool,
    {
        self.messages.iter().rev().find(|m| pred(m))
    }

    /// Replace the whole transcript with finished messages
    pub fn replace(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages
            .into_iter()
            .map(|mut m| {
                m.is_streaming = false;
                m
            })
            .collect();
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Read-only view
    #[must_use]
    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Iterate in order
    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }
}

/// Counters for frames that could not be handled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeDiagnostics {
    /// Frames that were not valid JSON or lacked required fields
    pub malformed_frames: u64,
    /// Well-formed frames with an unrecognized `type`
    pub unknown_frames: u64,
}

/// Client-side session
#[derive(Debug)]
pub struct Session {
    /// Server session id, set by the handshake
    pub id: Option<SessionId>,
    /// Whether the server reported an available assistant
    pub assistant_available: bool,
    /// Transcript
    pub messages: MessageLog,
    /// Connection lifecycle and reconnect bookkeeping
    pub connection: ConnectionManager,
    /// In-flight response tracking
    pub stream: StreamAccumulator,
    /// Cached dataset summaries used for snapshots
    pub datasets: Vec<DatasetSummary>,
    /// What the user is currently looking at
    pub location: Location,
    /// Whether the chat panel is visible
    pub panel_open: bool,
    /// Frame decoding counters
    pub diagnostics: DecodeDiagnostics,
    welcomed: bool,
}

impl Session {
    /// Create a fresh session
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            id: None,
            assistant_available: false,
            messages: MessageLog::new(),
            connection,
            stream: StreamAccumulator::new(),
            datasets: Vec::new(),
            location: Location::root(),
            panel_open: true,
            diagnostics: DecodeDiagnostics::default(),
            welcomed: false,
        }
    }

    /// Add a client notice to the transcript
    pub fn add_system_message(&mut self, content: impl Into<String>) -> MessageId {
        let msg = ChatMessage::system(content);
        let id = msg.id.clone();
        self.messages.push(msg);
        id
    }

    /// Seed the welcome message on the first handshake
    ///
    /// Only the first call per session has any effect, and nothing is added
    /// when the transcript already has content (e.g. restored history).
    pub fn seed_welcome(&mut self, welcome: Option<&str>) -> bool {
        if self.welcomed {
            return false;
        }
        self.welcomed = true;
        match welcome {
            Some(text) if self.messages.is_empty() && !text.is_empty() => {
                self.messages.push(ChatMessage::assistant(text));
                true
            }
            _ => false,
        }
    }

    /// Whether a response is currently streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.is_streaming()
    }
}
