//! Transport Layer
//!
//! Abstraction over the persistent bidirectional connection:
//! - `WebSocket`: the real assistant backend (feature `websocket`)
//! - `InProcess`: channel pairs driven directly by tests or embedders
//!
//! A [`Connector`] opens a [`Connection`]; the connection exposes an outbound
//! text sender and an inbound stream of [`TransportEvent`]s that always ends
//! with exactly one `Closed` event unless the client detached first.

pub mod endpoint;
pub mod in_process;
pub mod traits;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use endpoint::ws_url;
pub use in_process::{ConnectAttempt, InProcessConnector, PeerConnection, PeerListener};
pub use traits::{Connection, Connector, OutboundMessage, TransportError, TransportEvent};

#[cfg(feature = "websocket")]
pub use websocket::WsConnector;
