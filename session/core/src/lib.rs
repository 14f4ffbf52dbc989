//! Session Core - Persistent Assistant Session Client
//!
//! This crate keeps an interactive chat surface connected to a backend
//! assistant service over one long-lived bidirectional connection. It owns
//! the connection/session state machine and nothing else: rendering is left
//! to whatever surface drives it (the `session-cli` binary, tests, or an
//! embedding application).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         UI Surface                             │
//! │        SessionHandle: commands ▲ SessionView / Notification    │
//! └──────────────────────────────┼────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼────────────────────────────────┐
//! │                       SESSION CLIENT                           │
//! │  ┌───────────────────────────┴──────────────────────────────┐ │
//! │  │                    SessionClient (actor)                  │ │
//! │  │  ┌────────────┐ ┌────────────┐ ┌──────────┐ ┌──────────┐ │ │
//! │  │  │ Connection │ │ Dispatcher │ │  Stream  │ │ Snapshot │ │ │
//! │  │  │  Manager   │ │            │ │ Accum.   │ │ Publisher│ │ │
//! │  │  └────────────┘ └────────────┘ └──────────┘ └──────────┘ │ │
//! │  │  ┌──────────────────┐ ┌───────────────────────────────┐  │ │
//! │  │  │ ConfirmationGate │ │     SessionHistoryLoader      │  │ │
//! │  │  └──────────────────┘ └───────────────────────────────┘  │ │
//! │  └──────────────────────────────────────────────────────────┘ │
//! │        transport::Connector             api::ApiClient         │
//! └───────────────┬──────────────────────────────┬────────────────┘
//!                 │ WebSocket frames             │ REST (history,
//!                 ▼                              ▼  datasets)
//!                          Assistant service
//! ```
//!
//! # Key Types
//!
//! - [`SessionClient`]: the event loop owning the session and the connection
//! - [`SessionHandle`]: what a surface holds to drive the client
//! - [`SessionView`]: read-only picture of the session after every event
//! - [`ServerFrame`] / [`ClientFrame`]: the wire protocol
//!
//! # Quick Start
//!
//! ```ignore
//! use session_core::{
//!     api::{Credentials, RestClient},
//!     config::load_config,
//!     transport::WsConnector,
//!     SessionClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!     let api = RestClient::new(&config.connection.api_origin, &config.api)?;
//!     let connector = WsConnector::from_config(&config.connection);
//!
//!     let (client, mut handle) = SessionClient::new(&config, connector, api);
//!     tokio::spawn(client.run());
//!
//!     handle.login(Credentials::new("token")).await?;
//!     handle.wait_for(|v| v.connection.state.is_connected()).await?;
//!     handle.send_text("What changed in my sales dataset?").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`client`]: the actor and its handle
//! - [`connection`]: connection state machine and backoff
//! - [`timer`]: single-slot reconnect timer and countdown ticker
//! - [`protocol`]: tagged inbound and outbound frames
//! - [`dispatcher`]: routes inbound frames to handlers
//! - [`streaming`]: accumulates streamed responses
//! - [`snapshot`]: client context sent to the server
//! - [`confirmation`]: tool action approval handshake
//! - [`history`]: conversation replay on login
//! - [`transport`]: WebSocket and in-process connectors
//! - [`api`]: REST boundary
//! - [`config`]: layered configuration
//! - [`preferences`]: persisted user preferences

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod client;
pub mod config;
pub mod confirmation;
pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod history;
pub mod messages;
pub mod preferences;
pub mod protocol;
pub mod session;
pub mod snapshot;
pub mod streaming;
pub mod timer;
pub mod transport;

// Re-exports for convenience
pub use api::{ApiClient, ApiError, Credentials, RestClient};
pub use client::{SessionClient, SessionError, SessionHandle, SessionView};
pub use confirmation::{ConfirmRequest, ConfirmResult, ConfirmationGate};
pub use connection::{
    backoff_delay, CloseDisposition, ClosePolicy, ConnectionManager, ConnectionState,
    ConnectionStatus,
};
pub use dispatcher::{Dispatcher, Effect, Notification};
pub use events::SessionCommand;
pub use history::{HistoryRecord, SessionHistoryLoader};
pub use messages::{MessageId, MessageRole, SessionId};
pub use preferences::{PreferenceStore, Preferences, ResponseTone};
pub use protocol::{ClientFrame, ServerFrame, Usage};
pub use session::{ChatMessage, DecodeDiagnostics, MessageKind, MessageLog, NudgeInfo, Session};
pub use snapshot::{DatasetSummary, Location, SnapshotPublisher, StateSnapshot};
pub use streaming::{StreamAccumulator, StreamError};
pub use timer::{CountdownTicker, ReconnectTimer};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
