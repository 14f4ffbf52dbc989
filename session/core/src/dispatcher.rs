//! Protocol Dispatcher
//!
//! Routes each decoded server frame to its handler. Handlers mutate the
//! [`Session`] in place and return [`Effect`]s for the client actor to carry
//! out (frames to send, snapshots to publish, notifications to raise), which
//! keeps this module free of I/O.
//!
//! Malformed frames and unknown frame types are counted and otherwise
//! ignored; neither ever mutates the transcript.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::confirmation::{ConfirmRequest, ConfirmResult, ConfirmationGate};
use crate::messages::SessionId;
use crate::protocol::{self, ClientFrame, ServerFrame, Usage};
use crate::session::{ChatMessage, NudgeInfo, Session, ToolResult};

/// Appended when the server reports a spend limit without its own text
pub const BALANCE_GATE_MESSAGE: &str =
    "You've reached your spending limit. Add funds or raise your limit to keep chatting.";

/// Something the actor must do after a frame was handled
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Send a frame to the server
    Send(ClientFrame),
    /// Publish a state snapshot for the current location
    PublishSnapshot,
    /// Raise a user notification
    Notify(Notification),
}

/// User-facing notification raised while the chat panel is hidden
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Nudge that caused it, if any
    pub nudge_id: Option<String>,
    /// Text to show
    pub message: String,
    /// Optional icon name
    pub icon: Option<String>,
}

/// Friendly text for known error codes; unknown codes show the server text
#[must_use]
pub fn friendly_error(code: &str, message: &str) -> String {
    let known = match code {
        "rate_limited" => Some("You're sending messages too quickly. Wait a moment and try again."),
        "insufficient_balance" => Some("Your balance is too low to continue. Top up to keep chatting."),
        "context_length_exceeded" => {
            Some("This conversation is too long to continue. Start a new chat to keep going.")
        }
        "service_unavailable" => {
            Some("The assistant is temporarily unavailable. Please try again shortly.")
        }
        "invalid_message" => Some("That message couldn't be processed. Please rephrase and try again."),
        _ => None,
    };
    match known {
        Some(text) => text.to_string(),
        None if !message.is_empty() => message.to_string(),
        None if !code.is_empty() => format!("Something went wrong ({code})."),
        None => "Something went wrong.".to_string(),
    }
}

/// Routes server frames to handlers
#[derive(Clone, Debug, Default)]
pub struct Dispatcher {
    welcome_message: Option<String>,
}

impl Dispatcher {
    /// Dispatcher that seeds `welcome_message` on the first handshake
    #[must_use]
    pub fn new(welcome_message: Option<String>) -> Self {
        Self { welcome_message }
    }

    /// Decode and dispatch one text frame
    pub fn handle_text(&self, session: &mut Session, text: &str) -> Vec<Effect> {
        match protocol::decode(text) {
            Ok(frame) => self.dispatch(session, frame),
            Err(e) => {
                session.diagnostics.malformed_frames += 1;
                warn!(error = %e, "Dropping malformed frame");
                Vec::new()
            }
        }
    }

    /// Dispatch one decoded frame
    pub fn dispatch(&self, session: &mut Session, frame: ServerFrame) -> Vec<Effect> {
        trace!(kind = frame.kind(), "Dispatching frame");
        match frame {
            ServerFrame::Connected {
                session_id,
                assistant_available,
            } => self.on_connected(session, session_id, assistant_available),
            ServerFrame::Ping { nonce } => on_ping(nonce),
            ServerFrame::Heartbeat => Vec::new(),
            ServerFrame::StreamChunk { chunk, .. } => on_stream_chunk(session, &chunk),
            ServerFrame::StreamEnd {
                full_text, usage, ..
            } => on_stream_end(session, full_text, usage),
            ServerFrame::Stopped => on_stopped(session),
            ServerFrame::Error { code, message } => on_error(session, &code, &message),
            ServerFrame::BalanceGate { message } => on_balance_gate(session, message),
            ServerFrame::Nudge {
                nudge_id,
                trigger,
                message,
                dismissable,
                icon,
            } => on_nudge(
                session,
                message,
                NudgeInfo {
                    nudge_id,
                    trigger,
                    dismissable,
                    icon,
                    dismissed: false,
                },
            ),
            ServerFrame::ToolStatus { tool, status } => on_tool_status(session, &tool, &status),
            ServerFrame::ToolResult { tool, result } => on_tool_result(session, tool, result),
            ServerFrame::ConfirmRequest {
                confirm_id,
                tool,
                description,
                details,
                expires_in_seconds,
            } => {
                let request = ConfirmRequest {
                    confirm_id,
                    tool,
                    description,
                    details,
                    expires_in_seconds,
                    received_at: Utc::now(),
                };
                ConfirmationGate::attach(
                    &mut session.messages,
                    session.stream.in_flight_id(),
                    request,
                );
                Vec::new()
            }
            ServerFrame::ConfirmResult {
                confirm_id,
                success,
                message,
            } => {
                ConfirmationGate::resolve(
                    &mut session.messages,
                    ConfirmResult {
                        confirm_id,
                        success,
                        message,
                    },
                );
                Vec::new()
            }
            ServerFrame::Unknown => {
                session.diagnostics.unknown_frames += 1;
                debug!("Ignoring unknown frame type");
                Vec::new()
            }
        }
    }

    fn on_connected(
        &self,
        session: &mut Session,
        session_id: SessionId,
        assistant_available: bool,
    ) -> Vec<Effect> {
        debug!(session_id = %session_id, assistant_available, "Handshake complete");
        session.id = Some(session_id);
        session.assistant_available = assistant_available;
        session.seed_welcome(self.welcome_message.as_deref());
        vec![Effect::PublishSnapshot]
    }
}

fn on_ping(nonce: Value) -> Vec<Effect> {
    vec![Effect::Send(ClientFrame::Pong { nonce })]
}

fn on_stream_chunk(session: &mut Session, chunk: &str) -> Vec<Effect> {
    if !session.stream.append_chunk(&mut session.messages, chunk) {
        trace!("Ignoring chunk with no response in flight");
    }
    Vec::new()
}

fn on_stream_end(
    session: &mut Session,
    full_text: Option<String>,
    usage: Option<Usage>,
) -> Vec<Effect> {
    session
        .stream
        .finalize(&mut session.messages, full_text, usage);
    Vec::new()
}

fn on_stopped(session: &mut Session) -> Vec<Effect> {
    session.stream.acknowledge_stop(&mut session.messages);
    Vec::new()
}

fn on_error(session: &mut Session, code: &str, message: &str) -> Vec<Effect> {
    warn!(code, message, "Server reported an error");
    session.stream.abort(&mut session.messages);
    session.add_system_message(friendly_error(code, message));
    Vec::new()
}

fn on_balance_gate(session: &mut Session, message: Option<String>) -> Vec<Effect> {
    let text = message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| BALANCE_GATE_MESSAGE.to_string());
    session.add_system_message(text);
    Vec::new()
}

fn on_nudge(session: &mut Session, message: String, info: NudgeInfo) -> Vec<Effect> {
    let notification = Notification {
        nudge_id: Some(info.nudge_id.clone()),
        message: message.clone(),
        icon: info.icon.clone(),
    };
    session.messages.push(ChatMessage::nudge(message, info));
    if session.panel_open {
        Vec::new()
    } else {
        vec![Effect::Notify(notification)]
    }
}

fn streaming_assistant(session: &mut Session) -> Option<&mut ChatMessage> {
    let id = session.stream.in_flight_id()?;
    session.messages.streaming_mut(id)
}

fn on_tool_status(session: &mut Session, tool: &str, status: &str) -> Vec<Effect> {
    match streaming_assistant(session) {
        Some(msg) => {
            msg.tool_status = (status == "executing").then(|| format!("Running {tool}..."));
        }
        None => debug!(tool, status, "Ignoring tool_status with no response in flight"),
    }
    Vec::new()
}

fn on_tool_result(session: &mut Session, tool: String, result: Value) -> Vec<Effect> {
    let entry = ToolResult { tool, result };
    match streaming_assistant(session) {
        Some(msg) => {
            msg.tool_results.push(entry);
            msg.tool_status = None;
        }
        None => {
            debug!(tool = %entry.tool, "Holding late tool_result in its own entry");
            let mut holder = ChatMessage::assistant(String::new());
            holder.tool_results.push(entry);
            session.messages.push(holder);
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ClosePolicy, ConnectionManager};
    use crate::messages::{MessageId, MessageRole};
    use crate::session::MessageKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn session() -> Session {
        Session::new(ConnectionManager::new(ClosePolicy::default()))
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Some("Hi! Ask me anything about your data.".to_string()))
    }

    fn streaming_session() -> Session {
        let mut s = session();
        s.stream.begin(&mut s.messages, "question").unwrap();
        s
    }

    fn transcript(s: &Session) -> Vec<(MessageRole, String, bool)> {
        s.messages
            .iter()
            .map(|m| (m.role, m.content.clone(), m.is_streaming))
            .collect()
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    #[test]
    fn test_connected_sets_session_and_publishes_snapshot() {
        let mut s = session();
        let effects = dispatcher().dispatch(
            &mut s,
            ServerFrame::Connected {
                session_id: SessionId::from("s1"),
                assistant_available: true,
            },
        );
        assert_eq!(effects, vec![Effect::PublishSnapshot]);
        assert_eq!(s.id, Some(SessionId::from("s1")));
        assert!(s.assistant_available);
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages.as_slice()[0].role, MessageRole::Assistant);
    }

    #[test]
    fn test_reconnect_handshake_does_not_repeat_welcome() {
        let mut s = session();
        let d = dispatcher();
        let connected = ServerFrame::Connected {
            session_id: SessionId::from("s1"),
            assistant_available: true,
        };
        d.dispatch(&mut s, connected.clone());
        d.dispatch(&mut s, connected);
        assert_eq!(s.messages.len(), 1);
    }

    #[test]
    fn test_ping_echoes_nonce() {
        let mut s = session();
        let nonce = json!({"n": 12, "at": "t"});
        let effects = dispatcher().dispatch(
            &mut s,
            ServerFrame::Ping {
                nonce: nonce.clone(),
            },
        );
        assert_eq!(effects, vec![Effect::Send(ClientFrame::Pong { nonce })]);
        assert!(s.messages.is_empty());
    }

    // ========================================================================
    // Robustness
    // ========================================================================

    #[test]
    fn test_unknown_frames_leave_state_untouched() {
        let mut s = streaming_session();
        let before = transcript(&s);
        let d = dispatcher();
        for _ in 0..3 {
            assert!(d
                .handle_text(&mut s, r#"{"type":"brand_new_thing","x":1}"#)
                .is_empty());
        }
        assert_eq!(transcript(&s), before);
        assert_eq!(s.diagnostics.unknown_frames, 3);
        assert!(s.is_streaming());
    }

    #[test]
    fn test_malformed_frames_are_counted() {
        let mut s = session();
        let d = dispatcher();
        assert!(d.handle_text(&mut s, "{oops").is_empty());
        assert!(d.handle_text(&mut s, r#"{"type":"ping"}"#).is_empty());
        assert_eq!(s.diagnostics.malformed_frames, 2);
        assert!(s.messages.is_empty());
    }

    // ========================================================================
    // Streaming
    // ========================================================================

    #[test]
    fn test_chunks_then_end() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.handle_text(&mut s, r#"{"type":"stream_chunk","message_id":"srv","chunk":"Hel"}"#);
        d.handle_text(&mut s, r#"{"type":"stream_chunk","message_id":"srv","chunk":"lo"}"#);
        assert_eq!(s.messages.last().unwrap().content, "Hello");

        d.handle_text(
            &mut s,
            r#"{"type":"stream_end","message_id":"srv","full_text":"Hello!","usage":{"input_tokens":1,"output_tokens":2}}"#,
        );
        let tail = s.messages.last().unwrap();
        assert_eq!(tail.content, "Hello!");
        assert!(!tail.is_streaming);
        assert_eq!(tail.usage.as_ref().map(|u| u.output_tokens), Some(2));
        assert!(!s.is_streaming());
    }

    #[test]
    fn test_stray_chunk_after_end_is_ignored() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.dispatch(
            &mut s,
            ServerFrame::StreamEnd {
                message_id: None,
                full_text: Some("done".to_string()),
                usage: None,
            },
        );
        d.dispatch(
            &mut s,
            ServerFrame::StreamChunk {
                message_id: Some(MessageId::from("late")),
                chunk: "late".to_string(),
            },
        );
        assert_eq!(s.messages.last().unwrap().content, "done");
    }

    #[test]
    fn test_error_mid_stream_keeps_partial_then_notice() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.dispatch(
            &mut s,
            ServerFrame::StreamChunk {
                message_id: None,
                chunk: "The answer is".to_string(),
            },
        );
        d.dispatch(
            &mut s,
            ServerFrame::Error {
                code: "rate_limited".to_string(),
                message: "429".to_string(),
            },
        );

        assert!(!s.is_streaming());
        let tail: Vec<&ChatMessage> = s.messages.iter().rev().take(2).collect();
        assert_eq!(tail[0].role, MessageRole::System);
        assert_eq!(tail[0].content, friendly_error("rate_limited", ""));
        assert_eq!(tail[1].kind, MessageKind::Interrupted);
        assert_eq!(tail[1].content, "The answer is");
        assert!(s.messages.iter().all(|m| !m.is_streaming));
    }

    #[test]
    fn test_stopped_finalizes_partial() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.dispatch(
            &mut s,
            ServerFrame::StreamChunk {
                message_id: None,
                chunk: "partial".to_string(),
            },
        );
        s.stream.request_stop();
        d.dispatch(&mut s, ServerFrame::Stopped);
        assert!(!s.is_streaming());
        assert_eq!(s.messages.last().unwrap().content, "partial");
    }

    #[test]
    fn test_friendly_error_fallbacks() {
        assert_eq!(friendly_error("weird", "Server says no"), "Server says no");
        assert_eq!(friendly_error("weird", ""), "Something went wrong (weird).");
        assert_eq!(friendly_error("", ""), "Something went wrong.");
    }

    // ========================================================================
    // Nudges, Balance, Tools
    // ========================================================================

    #[test]
    fn test_balance_gate_uses_default_text() {
        let mut s = session();
        dispatcher().dispatch(&mut s, ServerFrame::BalanceGate { message: None });
        assert_eq!(s.messages.last().unwrap().content, BALANCE_GATE_MESSAGE);
    }

    #[test]
    fn test_nudge_notifies_only_when_panel_closed() {
        let nudge = ServerFrame::Nudge {
            nudge_id: "n1".to_string(),
            trigger: "idle".to_string(),
            message: "Try asking for a chart".to_string(),
            dismissable: true,
            icon: Some("bulb".to_string()),
        };

        let mut open = session();
        assert!(dispatcher().dispatch(&mut open, nudge.clone()).is_empty());
        assert_eq!(open.messages.last().unwrap().kind, MessageKind::Nudge);

        let mut closed = session();
        closed.panel_open = false;
        let effects = dispatcher().dispatch(&mut closed, nudge);
        assert_eq!(
            effects,
            vec![Effect::Notify(Notification {
                nudge_id: Some("n1".to_string()),
                message: "Try asking for a chart".to_string(),
                icon: Some("bulb".to_string()),
            })]
        );
    }

    #[test]
    fn test_nudge_mid_stream_keeps_stream_last() {
        let mut s = streaming_session();
        dispatcher().dispatch(
            &mut s,
            ServerFrame::Nudge {
                nudge_id: "n1".to_string(),
                trigger: "t".to_string(),
                message: "hint".to_string(),
                dismissable: false,
                icon: None,
            },
        );
        assert!(s.messages.last().unwrap().is_streaming);
        dispatcher().dispatch(
            &mut s,
            ServerFrame::StreamChunk {
                message_id: None,
                chunk: "still here".to_string(),
            },
        );
        assert_eq!(s.messages.last().unwrap().content, "still here");
    }

    #[test]
    fn test_tool_status_lifecycle() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.dispatch(
            &mut s,
            ServerFrame::ToolStatus {
                tool: "sql".to_string(),
                status: "executing".to_string(),
            },
        );
        assert_eq!(
            s.messages.last().unwrap().tool_status.as_deref(),
            Some("Running sql...")
        );

        d.dispatch(
            &mut s,
            ServerFrame::ToolResult {
                tool: "sql".to_string(),
                result: json!({"rows": 3}),
            },
        );
        let tail = s.messages.last().unwrap();
        assert_eq!(tail.tool_status, None);
        assert_eq!(tail.tool_results.len(), 1);
        assert_eq!(tail.tool_results[0].result, json!({"rows": 3}));

        d.dispatch(
            &mut s,
            ServerFrame::ToolStatus {
                tool: "sql".to_string(),
                status: "executing".to_string(),
            },
        );
        d.dispatch(
            &mut s,
            ServerFrame::ToolStatus {
                tool: "sql".to_string(),
                status: "completed".to_string(),
            },
        );
        assert_eq!(s.messages.last().unwrap().tool_status, None);
    }

    #[test]
    fn test_confirm_round_trip_through_frames() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.handle_text(
            &mut s,
            r#"{"type":"confirm_request","confirm_id":"c9","tool":"drop_table","description":"Drop table t","expires_in_seconds":30}"#,
        );
        assert!(ConfirmationGate::approve(&s.messages, "c9").is_some());

        d.handle_text(
            &mut s,
            r#"{"type":"confirm_result","confirm_id":"c9","success":true,"message":"Dropped"}"#,
        );
        let holder = s
            .messages
            .find_last(|m| m.confirm_request.is_some())
            .unwrap();
        assert_eq!(
            holder.confirm_result.as_ref().map(|r| r.success),
            Some(true)
        );
    }

    fn confirm_request_frame(id: &str) -> String {
        format!(
            r#"{{"type":"confirm_request","confirm_id":"{id}","tool":"delete_rows","description":"Delete rows","expires_in_seconds":60}}"#
        )
    }

    #[test]
    fn test_confirm_request_after_stream_end_keeps_earlier_request() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.handle_text(&mut s, r#"{"type":"stream_chunk","chunk":"Checking"}"#);
        d.handle_text(&mut s, &confirm_request_frame("c1"));
        d.handle_text(&mut s, r#"{"type":"stream_end","full_text":"Checking rows"}"#);
        d.handle_text(&mut s, &confirm_request_frame("c2"));

        let pending: Vec<&str> = ConfirmationGate::pending(&s.messages)
            .iter()
            .map(|r| r.confirm_id.as_str())
            .collect();
        assert_eq!(pending, vec!["c1", "c2"]);
        assert!(ConfirmationGate::approve(&s.messages, "c1").is_some());

        d.handle_text(
            &mut s,
            r#"{"type":"confirm_result","confirm_id":"c1","success":true,"message":"Deleted"}"#,
        );
        let answered = s
            .messages
            .find_last(|m| m.confirm_result.is_some())
            .unwrap();
        assert_eq!(answered.content, "Checking rows");
        assert_eq!(
            answered.confirm_request.as_ref().map(|r| r.confirm_id.as_str()),
            Some("c1")
        );
    }

    #[test]
    fn test_confirmation_survives_later_stream_cycles() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.handle_text(&mut s, &confirm_request_frame("c1"));
        d.handle_text(&mut s, r#"{"type":"stream_end","full_text":"M1"}"#);
        for turn in 2..=6 {
            s.stream.begin(&mut s.messages, format!("q{turn}")).unwrap();
            d.handle_text(&mut s, r#"{"type":"stream_chunk","chunk":"partial"}"#);
            d.handle_text(
                &mut s,
                &format!(r#"{{"type":"stream_end","full_text":"M{turn}"}}"#),
            );
        }

        d.handle_text(
            &mut s,
            r#"{"type":"confirm_result","confirm_id":"c1","success":false,"message":"Expired"}"#,
        );
        let resolved: Vec<&str> = s
            .messages
            .iter()
            .filter(|m| m.confirm_result.is_some())
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(resolved, vec!["M1"]);
    }

    #[test]
    fn test_tool_status_after_stream_end_is_ignored() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.handle_text(&mut s, r#"{"type":"stream_end","full_text":"Done"}"#);
        d.handle_text(
            &mut s,
            r#"{"type":"tool_status","tool":"sql","status":"executing"}"#,
        );

        let finished = s.messages.last().unwrap();
        assert_eq!(finished.content, "Done");
        assert!(!finished.is_streaming);
        assert_eq!(finished.tool_status, None);
    }

    #[test]
    fn test_late_tool_result_goes_to_holder() {
        let mut s = streaming_session();
        let d = dispatcher();
        d.handle_text(&mut s, r#"{"type":"stream_end","full_text":"Done"}"#);
        let before = s.messages.len();
        d.handle_text(
            &mut s,
            r#"{"type":"tool_result","tool":"sql","result":{"rows":3}}"#,
        );

        assert_eq!(s.messages.len(), before + 1);
        assert!(s.messages.as_slice()[before - 1].tool_results.is_empty());
        let holder = s.messages.last().unwrap();
        assert_eq!(holder.role, MessageRole::Assistant);
        assert!(holder.content.is_empty());
        assert_eq!(holder.tool_results.len(), 1);
        assert_eq!(holder.tool_results[0].result, json!({"rows": 3}));
    }
}
