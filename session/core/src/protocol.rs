//! Wire Protocol
//!
//! JSON text frames exchanged over the persistent connection. Every frame is
//! an object with a `type` discriminator:
//!
//! ```text
//! server → client   connected, stream_chunk, stream_end, stopped, error, ping,
//!                   balance_gate, nudge, tool_status, tool_result,
//!                   confirm_request, confirm_result, heartbeat
//! client → server   message, stop, nudge_dismiss, confirm_action, pong,
//!                   state_snapshot
//! ```
//!
//! Frames with an unrecognized `type` decode to [`ServerFrame::Unknown`] so the
//! server can add new frame types without breaking older clients.
//!
//! # Security
//!
//! - Maximum frame size is enforced before parsing

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::messages::{MessageId, SessionId};
use crate::snapshot::StateSnapshot;

/// Maximum accepted frame size (1 MB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame encode/decode failures
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame exceeds [`MAX_FRAME_SIZE`]
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// Actual size
        size: usize,
        /// Allowed maximum
        max: usize,
    },

    /// Payload is not a valid frame
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Token accounting attached to a finished assistant response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens consumed
    #[serde(default)]
    pub input_tokens: u64,
    /// Completion tokens produced
    #[serde(default)]
    pub output_tokens: u64,
    /// Cost of the turn, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// Frames sent by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    // ============================================
    // Session Lifecycle
    // ============================================
    /// Handshake completed
    Connected {
        /// Server-side session identifier
        session_id: SessionId,
        /// Whether an assistant model is ready to answer
        #[serde(default)]
        assistant_available: bool,
    },

    /// Liveness probe; must be answered with a `pong` carrying the same nonce
    Ping {
        /// Opaque nonce, echoed unchanged
        nonce: Value,
    },

    /// Informational keep-alive
    Heartbeat,

    // ============================================
    // Streaming
    // ============================================
    /// Partial assistant output
    StreamChunk {
        /// Server's id for the response (informational)
        #[serde(default)]
        message_id: Option<MessageId>,
        /// Text to append
        chunk: String,
    },

    /// Assistant response finished
    StreamEnd {
        /// Server's id for the response (informational)
        #[serde(default)]
        message_id: Option<MessageId>,
        /// Authoritative full text; wins over the accumulated chunks
        #[serde(default)]
        full_text: Option<String>,
        /// Token accounting for the turn
        #[serde(default)]
        usage: Option<Usage>,
    },

    /// Server acknowledged a `stop` request
    Stopped,

    /// Request failed
    Error {
        /// Machine-readable error code
        #[serde(default)]
        code: String,
        /// Server-provided description
        #[serde(default)]
        message: String,
    },

    // ============================================
    // Account and Guidance
    // ============================================
    /// Spend limit reached
    BalanceGate {
        /// Server-provided explanation
        #[serde(default)]
        message: Option<String>,
    },

    /// Contextual hint for the user
    Nudge {
        /// Nudge identifier, echoed on dismissal
        nudge_id: String,
        /// What triggered the nudge, echoed on dismissal
        #[serde(default)]
        trigger: String,
        /// Text to show
        message: String,
        /// Whether the user may dismiss it
        #[serde(default)]
        dismissable: bool,
        /// Optional icon name
        #[serde(default)]
        icon: Option<String>,
    },

    // ============================================
    // Tools
    // ============================================
    /// Progress of a tool invocation
    ToolStatus {
        /// Tool name
        tool: String,
        /// Status string; `executing` marks an active run
        status: String,
    },

    /// Output of a finished tool invocation
    ToolResult {
        /// Tool name
        tool: String,
        /// Tool-specific payload
        #[serde(default)]
        result: Value,
    },

    /// A tool needs explicit user approval before running
    ConfirmRequest {
        /// Confirmation identifier
        confirm_id: String,
        /// Tool awaiting approval
        tool: String,
        /// Human-readable description of the action
        #[serde(default)]
        description: String,
        /// Tool-specific details
        #[serde(default)]
        details: Value,
        /// Advisory validity window
        #[serde(default)]
        expires_in_seconds: u64,
    },

    /// Outcome of an approved action
    ConfirmResult {
        /// Confirmation identifier
        confirm_id: String,
        /// Whether the action succeeded
        success: bool,
        /// Outcome description
        #[serde(default)]
        message: String,
    },

    /// Any frame type this client does not know
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    /// Frame type name for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Ping { .. } => "ping",
            Self::Heartbeat => "heartbeat",
            Self::StreamChunk { .. } => "stream_chunk",
            Self::StreamEnd { .. } => "stream_end",
            Self::Stopped => "stopped",
            Self::Error { .. } => "error",
            Self::BalanceGate { .. } => "balance_gate",
            Self::Nudge { .. } => "nudge",
            Self::ToolStatus { .. } => "tool_status",
            Self::ToolResult { .. } => "tool_result",
            Self::ConfirmRequest { .. } => "confirm_request",
            Self::ConfirmResult { .. } => "confirm_result",
            Self::Unknown => "unknown",
        }
    }
}

/// Frames sent by the client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A user message
    Message {
        /// Message text
        content: String,
        /// Client-generated id of the user message
        message_id: MessageId,
    },

    /// Abort the in-flight response
    Stop,

    /// Dismiss a nudge
    NudgeDismiss {
        /// Nudge identifier
        nudge_id: String,
        /// Trigger reported with the nudge
        trigger: String,
        /// Suppress this nudge permanently
        permanent: bool,
    },

    /// Approve a pending tool action
    ConfirmAction {
        /// Confirmation identifier
        confirm_id: String,
    },

    /// Answer to a `ping`
    Pong {
        /// Nonce copied from the ping
        nonce: Value,
    },

    /// Description of what the user is currently looking at
    StateSnapshot(StateSnapshot),
}

/// Decode one server frame from a text payload
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] for oversized payloads and
/// [`FrameError::Json`] when the payload is not a JSON object with a `type`.
pub fn decode(text: &str) -> Result<ServerFrame, FrameError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode one client frame to a text payload
///
/// # Errors
///
/// Returns [`FrameError::Json`] if serialization fails and
/// [`FrameError::TooLarge`] if the result exceeds [`MAX_FRAME_SIZE`].
pub fn encode(frame: &ClientFrame) -> Result<String, FrameError> {
    let text = serde_json::to_string(frame)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    // ========================================================================
    // Decoding
    // ========================================================================

    #[test]
    fn test_decode_connected() {
        let frame = decode(r#"{"type":"connected","session_id":"s-1","assistant_available":true}"#)
            .unwrap();
        assert_eq!(
            frame,
            ServerFrame::Connected {
                session_id: SessionId::from("s-1"),
                assistant_available: true,
            }
        );
    }

    #[test]
    fn test_decode_stream_end_with_usage() {
        let frame = decode(
            r#"{"type":"stream_end","message_id":"m1","full_text":"Hello","usage":{"input_tokens":3,"output_tokens":5}}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ServerFrame::StreamEnd {
                message_id: Some(MessageId::from("m1")),
                full_text: Some("Hello".to_string()),
                usage: Some(Usage {
                    input_tokens: 3,
                    output_tokens: 5,
                    cost_usd: None,
                }),
            }
        );
    }

    #[test]
    fn test_decode_ping_keeps_nonce_shape() {
        let frame = decode(r#"{"type":"ping","nonce":{"seq":7}}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Ping {
                nonce: json!({"seq": 7})
            }
        );
    }

    #[test]
    fn test_decode_unit_frames_ignore_extra_fields() {
        let frame = decode(r#"{"type":"stopped","message_id":"m1"}"#).unwrap();
        assert_eq!(frame, ServerFrame::Stopped);
        let frame = decode(r#"{"type":"heartbeat","ts":123}"#).unwrap();
        assert_eq!(frame, ServerFrame::Heartbeat);
    }

    #[test]
    fn test_decode_unknown_type() {
        let frame = decode(r#"{"type":"typing_indicator","who":"assistant"}"#).unwrap();
        assert_eq!(frame, ServerFrame::Unknown);
        assert_eq!(frame.kind(), "unknown");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"no_type":true}"#).is_err());
        assert!(decode(r#"{"type":"stream_chunk"}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let big = format!(
            r#"{{"type":"stream_chunk","chunk":"{}"}}"#,
            "x".repeat(MAX_FRAME_SIZE)
        );
        assert!(matches!(decode(&big), Err(FrameError::TooLarge { .. })));
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    #[test]
    fn test_encode_message() {
        let text = encode(&ClientFrame::Message {
            content: "hi".to_string(),
            message_id: MessageId::from("abc"),
        })
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"type": "message", "content": "hi", "message_id": "abc"})
        );
    }

    #[test]
    fn test_encode_stop_and_pong() {
        let stop: Value = serde_json::from_str(&encode(&ClientFrame::Stop).unwrap()).unwrap();
        assert_eq!(stop, json!({"type": "stop"}));

        let pong: Value = serde_json::from_str(
            &encode(&ClientFrame::Pong {
                nonce: json!("n-42"),
            })
            .unwrap(),
        )
        .unwrap();
        assert_eq!(pong, json!({"type": "pong", "nonce": "n-42"}));
    }

    #[test]
    fn test_encode_nudge_dismiss() {
        let value: Value = serde_json::from_str(
            &encode(&ClientFrame::NudgeDismiss {
                nudge_id: "n1".to_string(),
                trigger: "idle".to_string(),
                permanent: true,
            })
            .unwrap(),
        )
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "nudge_dismiss", "nudge_id": "n1", "trigger": "idle", "permanent": true})
        );
    }
}
