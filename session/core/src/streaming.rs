//! Stream Accumulator
//!
//! Turns the chunked `stream_*` frames for one assistant response into a
//! single transcript entry. One response may be in flight at a time; it is
//! identified by the id of the placeholder created when the user sent the
//! message, not by the id the server puts on its frames.
//!
//! ```text
//!          begin                    finalize / acknowledge_stop
//!   Idle ────────▶ Streaming ───────────────────────────────────▶ Idle
//!                     │ append_chunk (buffer + placeholder grow)
//!                     │
//!                     ├── abort   (error frame: partial kept as Interrupted)
//!                     └── abandon (connection lost: partial kept in place)
//! ```

use thiserror::Error;

use crate::messages::MessageId;
use crate::protocol::Usage;
use crate::session::{ChatMessage, MessageLog};

/// Stream lifecycle errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// A response is already in flight
    #[error("a response is already streaming")]
    AlreadyStreaming,
}

/// Tracks the in-flight assistant response
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    in_flight: Option<MessageId>,
    buffer: String,
    stop_requested: bool,
}

impl StreamAccumulator {
    /// Idle accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a response is in flight
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Id of the placeholder receiving chunks
    #[must_use]
    pub fn in_flight_id(&self) -> Option<&MessageId> {
        self.in_flight.as_ref()
    }

    /// Text accumulated so far
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Whether the user asked to stop the current response
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Append the user message and an empty assistant placeholder
    ///
    /// Returns the id of the user message, which is what the server expects
    /// in the outbound `message` frame.
    ///
    /// # Errors
    ///
    /// [`StreamError::AlreadyStreaming`] if a response is in flight; the
    /// transcript is left untouched.
    pub fn begin(
        &mut self,
        messages: &mut MessageLog,
        content: impl Into<String>,
    ) -> Result<MessageId, StreamError> {
        if self.is_streaming() || messages.streaming().is_some() {
            return Err(StreamError::AlreadyStreaming);
        }

        let user = ChatMessage::user(content);
        let user_id = user.id.clone();
        let placeholder = ChatMessage::streaming_placeholder();
        let placeholder_id = placeholder.id.clone();

        messages.push(user);
        messages.push_streaming(placeholder);

        self.in_flight = Some(placeholder_id);
        self.buffer.clear();
        self.stop_requested = false;
        Ok(user_id)
    }

    /// Apply one chunk
    ///
    /// Ignored unless the placeholder is still the streaming tail of the
    /// transcript. Returns whether the chunk was applied.
    pub fn append_chunk(&mut self, messages: &mut MessageLog, chunk: &str) -> bool {
        let Some(id) = self.in_flight.as_ref() else {
            return false;
        };
        let Some(msg) = messages.streaming_mut(id) else {
            return false;
        };
        self.buffer.push_str(chunk);
        msg.content.clone_from(&self.buffer);
        true
    }

    /// Finish the response
    ///
    /// `full_text` wins over the accumulated buffer when present. Any tool
    /// status left on the message is cleared. Returns whether a placeholder
    /// was finalized.
    pub fn finalize(
        &mut self,
        messages: &mut MessageLog,
        full_text: Option<String>,
        usage: Option<Usage>,
    ) -> bool {
        let Some(id) = self.in_flight.take() else {
            return false;
        };
        let buffer = std::mem::take(&mut self.buffer);
        self.stop_requested = false;

        let Some(msg) = messages.streaming_mut(&id) else {
            return false;
        };
        msg.content = full_text.unwrap_or(buffer);
        msg.usage = usage;
        msg.tool_status = None;
        msg.is_streaming = false;
        true
    }

    /// Server confirmed a stop; whatever arrived stays as the final content
    pub fn acknowledge_stop(&mut self, messages: &mut MessageLog) -> bool {
        self.finalize(messages, None, None)
    }

    /// The response failed
    ///
    /// The placeholder stops streaming. If any text arrived it is preserved as
    /// a separate [`MessageKind::Interrupted`](crate::session::MessageKind)
    /// entry so the caller can append the error notice after it. Returns the
    /// id of that entry.
    pub fn abort(&mut self, messages: &mut MessageLog) -> Option<MessageId> {
        let partial = std::mem::take(&mut self.buffer);
        self.abandon(messages);

        if partial.is_empty() {
            return None;
        }
        let interrupted = ChatMessage::interrupted(partial);
        let interrupted_id = interrupted.id.clone();
        messages.push(interrupted);
        Some(interrupted_id)
    }

    /// The connection dropped; keep what arrived and go idle
    pub fn abandon(&mut self, messages: &mut MessageLog) {
        if let Some(id) = self.in_flight.take() {
            if let Some(msg) = messages.streaming_mut(&id) {
                msg.is_streaming = false;
                msg.tool_status = None;
            }
        }
        self.buffer.clear();
        self.stop_requested = false;
    }

    /// Record a stop request; returns `false` when nothing is streaming
    pub fn request_stop(&mut self) -> bool {
        if !self.is_streaming() {
            return false;
        }
        self.stop_requested = true;
        true
    }
}
