//! Line Commands and Transcript Rendering
//!
//! Everything the terminal surface needs that is not I/O: parsing a typed
//! line into a [`Input`], and turning successive [`SessionView`]s into the
//! lines to print. Rendering only ever appends; a message is printed once it
//! has stopped streaming.

use std::collections::HashSet;

use session_core::{
    ChatMessage, ConnectionState, ConnectionStatus, Location, MessageKind, MessageRole,
    ResponseTone, SessionView,
};
use thiserror::Error;

/// Help text for `/help`
pub const HELP: &str = "\
Commands:
  <text>                    send a message
  /stop                     stop the current response
  /go <route> [title]       report a navigation (e.g. /go /datasets/42 Sales)
  /approve <confirm_id>     approve a pending tool action
  /dismiss <nudge_id> [--forever]
  /panel open|closed        report chat panel visibility
  /tone [concise|balanced|detailed]
  /login <token>            start a session
  /logout                   end the session
  /status                   show connection details
  /quit                     exit";

/// Parsed input line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Blank line
    Empty,
    /// Plain text to send
    Say(String),
    /// `/stop`
    Stop,
    /// `/go`
    Go(Location),
    /// `/approve`
    Approve(String),
    /// `/dismiss`
    Dismiss {
        /// Nudge to dismiss
        nudge_id: String,
        /// `--forever` was given
        permanent: bool,
    },
    /// `/panel`
    Panel(bool),
    /// `/tone`, optionally with a new value
    Tone(Option<ResponseTone>),
    /// `/login`
    Login(String),
    /// `/logout`
    Logout,
    /// `/status`
    Status,
    /// `/help`
    Help,
    /// `/quit`
    Quit,
}

/// Input that could not be parsed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Slash command not recognized
    #[error("unknown command '/{0}' (try /help)")]
    UnknownCommand(String),
    /// Required argument missing
    #[error("/{command} needs {what}")]
    MissingArgument {
        /// Command name
        command: &'static str,
        /// What is missing
        what: &'static str,
    },
    /// Argument not understood
    #[error("{0}")]
    InvalidArgument(String),
}

/// Parse one input line
///
/// # Errors
///
/// Returns a [`ParseError`] for unknown commands and bad arguments.
pub fn parse(line: &str) -> Result<Input, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    // `//text` sends a message starting with a slash
    if let Some(text) = line.strip_prefix("//") {
        return Ok(Input::Say(format!("/{text}")));
    }
    let Some(command_line) = line.strip_prefix('/') else {
        return Ok(Input::Say(line.to_string()));
    };

    let (command, rest) = command_line
        .split_once(char::is_whitespace)
        .map_or((command_line, ""), |(c, r)| (c, r.trim()));

    match command {
        "stop" => Ok(Input::Stop),
        "go" => {
            let (route, title) = rest
                .split_once(char::is_whitespace)
                .map_or((rest, ""), |(r, t)| (r, t.trim()));
            if route.is_empty() {
                return Err(ParseError::MissingArgument {
                    command: "go",
                    what: "a route",
                });
            }
            Ok(Input::Go(Location::parse(route, title)))
        }
        "approve" => required(rest, "approve", "a confirmation id").map(Input::Approve),
        "dismiss" => {
            let mut nudge_id = None;
            let mut permanent = false;
            for word in rest.split_whitespace() {
                match word {
                    "--forever" => permanent = true,
                    other if nudge_id.is_none() => nudge_id = Some(other.to_string()),
                    other => {
                        return Err(ParseError::InvalidArgument(format!(
                            "unexpected argument '{other}'"
                        )))
                    }
                }
            }
            let nudge_id = nudge_id.ok_or(ParseError::MissingArgument {
                command: "dismiss",
                what: "a nudge id",
            })?;
            Ok(Input::Dismiss {
                nudge_id,
                permanent,
            })
        }
        "panel" => match rest {
            "open" => Ok(Input::Panel(true)),
            "closed" | "close" => Ok(Input::Panel(false)),
            "" => Err(ParseError::MissingArgument {
                command: "panel",
                what: "open or closed",
            }),
            other => Err(ParseError::InvalidArgument(format!(
                "expected open or closed, got '{other}'"
            ))),
        },
        "tone" if rest.is_empty() => Ok(Input::Tone(None)),
        "tone" => rest
            .parse::<ResponseTone>()
            .map(|tone| Input::Tone(Some(tone)))
            .map_err(|e| ParseError::InvalidArgument(e.to_string())),
        "login" => required(rest, "login", "a token").map(Input::Login),
        "logout" => Ok(Input::Logout),
        "status" => Ok(Input::Status),
        "help" | "?" => Ok(Input::Help),
        "quit" | "exit" => Ok(Input::Quit),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

fn required(rest: &str, command: &'static str, what: &'static str) -> Result<String, ParseError> {
    if rest.is_empty() {
        Err(ParseError::MissingArgument { command, what })
    } else {
        Ok(rest.to_string())
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Turns view updates into printable lines
#[derive(Debug, Default)]
pub struct Renderer {
    printed: usize,
    last_status: Option<(ConnectionState, u32)>,
    announced_requests: HashSet<String>,
    announced_results: HashSet<String>,
}

impl Renderer {
    /// Renderer that has printed nothing yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for `view`
    pub fn update(&mut self, view: &SessionView) -> Vec<String> {
        let mut out = Vec::new();

        let status = (view.connection.state, view.connection.reconnect_attempt);
        if self.last_status != Some(status) {
            self.last_status = Some(status);
            out.push(format!("[{}]", format_status(view.connection)));
        }

        // Logout and history restore replace the whole transcript
        if view.messages.len() < self.printed {
            self.printed = 0;
            self.announced_requests.clear();
            self.announced_results.clear();
        }

        for msg in &view.messages[self.printed..] {
            if msg.is_streaming {
                break;
            }
            out.extend(format_message(msg));
            self.printed += 1;
        }

        for msg in &view.messages {
            if let Some(req) = &msg.confirm_request {
                if self.announced_requests.insert(req.confirm_id.clone()) {
                    out.push(format!(
                        "[confirm {}] {} wants to: {} (/approve {})",
                        req.confirm_id, req.tool, req.description, req.confirm_id
                    ));
                }
            }
            if let Some(res) = &msg.confirm_result {
                if self.announced_results.insert(res.confirm_id.clone()) {
                    let outcome = if res.success { "done" } else { "failed" };
                    out.push(format!("[confirm {}] {outcome}: {}", res.confirm_id, res.message));
                }
            }
        }

        out
    }
}

/// One-line connection status
#[must_use]
pub fn format_status(status: ConnectionStatus) -> String {
    match (status.state, status.countdown_secs) {
        (ConnectionState::Disconnected, Some(secs)) => format!(
            "Disconnected, retrying in {secs}s (attempt {})",
            status.reconnect_attempt
        ),
        (state, _) => state.description().to_string(),
    }
}

/// Lines for one finished message
#[must_use]
pub fn format_message(msg: &ChatMessage) -> Vec<String> {
    let mut lines = Vec::with_capacity(1 + msg.tool_results.len());
    let head = match (msg.role, msg.kind) {
        (_, MessageKind::Nudge) => {
            let hint = msg
                .nudge
                .as_ref()
                .filter(|n| n.dismissable && !n.dismissed)
                .map(|n| format!(" (/dismiss {})", n.nudge_id))
                .unwrap_or_default();
            format!("* {}{hint}", msg.content)
        }
        (_, MessageKind::Interrupted) => format!("assistant (interrupted)> {}", msg.content),
        (MessageRole::User, _) => format!("you> {}", msg.content),
        (MessageRole::Assistant, _) => format!("assistant> {}", msg.content),
        (MessageRole::System, _) => format!("! {}", msg.content),
    };
    // Holder messages created for tool output have no text of their own
    if !msg.content.is_empty() || msg.role != MessageRole::Assistant {
        lines.push(head);
    }
    for result in &msg.tool_results {
        lines.push(format!("  [{}] {}", result.tool, result.result));
    }
    lines
}
