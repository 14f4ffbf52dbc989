//! Transport Traits
//!
//! Defines the connector abstraction and the connection handle shared by
//! every transport implementation.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::connection::ABNORMAL_CLOSE_CODE;

/// Errors that can occur in transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection attempt did not finish in time
    #[error("connection timed out after {0}ms")]
    Timeout(u64),

    /// Endpoint URL could not be built
    #[error("invalid endpoint: {0}")]
    InvalidUrl(String),

    /// Frame could not be queued
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Connection is closed
    #[error("connection closed")]
    ConnectionClosed,
}

/// Something the transport observed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Frame(String),
    /// Non-fatal transport error; a `Closed` event follows
    Error(String),
    /// The connection is gone
    Closed {
        /// Close code (1006 when the peer vanished without a close frame)
        code: u16,
        /// Close reason
        reason: String,
    },
}

/// Instruction to the transport writer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Send a text frame
    Text(String),
    /// Close the connection
    Close,
}

/// Handle to one open connection
///
/// Dropping or closing the handle detaches the inbound stream first, so the
/// owner never observes events from a connection it closed on purpose.
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::Sender<OutboundMessage>,
    inbound: mpsc::Receiver<TransportEvent>,
}

impl Connection {
    /// Wrap the channel ends of a transport implementation
    #[must_use]
    pub fn new(
        outbound: mpsc::Sender<OutboundMessage>,
        inbound: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a text frame without waiting
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the writer is gone and
    /// [`TransportError::SendFailed`] if its queue is full.
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .try_send(OutboundMessage::Text(text))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Closed(_) => TransportError::ConnectionClosed,
                mpsc::error::TrySendError::Full(_) => {
                    TransportError::SendFailed("outbound queue full".to_string())
                }
            })
    }

    /// Next inbound event
    ///
    /// A transport that vanished without reporting a close is reported as an
    /// abnormal close.
    pub async fn recv(&mut self) -> TransportEvent {
        match self.inbound.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed {
                code: ABNORMAL_CLOSE_CODE,
                reason: "transport ended".to_string(),
            },
        }
    }

    /// Detach the inbound stream, then ask the transport to close
    pub fn close(self) {
        let Self { outbound, inbound } = self;
        drop(inbound);
        let _ = outbound.try_send(OutboundMessage::Close);
    }
}

/// Opens connections to an endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}
