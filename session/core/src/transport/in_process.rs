//! In-Process Transport
//!
//! Channel-based connector with no network involved. Each connection attempt
//! is reported to a [`PeerListener`]; accepted attempts hand the listener a
//! [`PeerConnection`] that plays the server side: it can push frames, read
//! what the client sent and close with any code.
//!
//! # Usage
//!
//! ```ignore
//! let (connector, mut listener) = InProcessConnector::new();
//! // give `connector` to the session client, then:
//! let mut peer = listener.accept().await.unwrap();
//! peer.send_frame(&ServerFrame::Heartbeat).await;
//! peer.close(1006, "gone").await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{Connection, Connector, OutboundMessage, TransportError, TransportEvent};
use crate::protocol::{ClientFrame, ServerFrame};

/// Default channel capacity for in-process connections
const DEFAULT_CAPACITY: usize = 100;

/// One connection attempt as seen by the listener
#[derive(Debug)]
pub struct ConnectAttempt {
    /// Requested URL
    pub url: String,
    /// Server side of the connection, `None` if the attempt was refused
    pub peer: Option<PeerConnection>,
}

/// [`Connector`] that hands the server side of each connection to a listener
#[derive(Clone, Debug)]
pub struct InProcessConnector {
    attempts: mpsc::UnboundedSender<ConnectAttempt>,
    refuse: Arc<AtomicBool>,
    capacity: usize,
}

impl InProcessConnector {
    /// Create a connector and the listener that receives its connections
    #[must_use]
    pub fn new() -> (Self, PeerListener) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with custom channel capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, PeerListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let refuse = Arc::new(AtomicBool::new(false));
        let connector = Self {
            attempts: tx,
            refuse: Arc::clone(&refuse),
            capacity: capacity.max(1),
        };
        (
            connector,
            PeerListener {
                attempts: rx,
                refuse,
            },
        )
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            let _ = self.attempts.send(ConnectAttempt {
                url: url.to_string(),
                peer: None,
            });
            return Err(TransportError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }

        let (out_tx, out_rx) = mpsc::channel(self.capacity);
        let (in_tx, in_rx) = mpsc::channel(self.capacity);
        let peer = PeerConnection {
            to_client: in_tx,
            from_client: out_rx,
        };
        self.attempts
            .send(ConnectAttempt {
                url: url.to_string(),
                peer: Some(peer),
            })
            .map_err(|_| TransportError::ConnectionFailed("listener dropped".to_string()))?;

        Ok(Connection::new(out_tx, in_rx))
    }
}

/// Receives every connection attempt made through an [`InProcessConnector`]
#[derive(Debug)]
pub struct PeerListener {
    attempts: mpsc::UnboundedReceiver<ConnectAttempt>,
    refuse: Arc<AtomicBool>,
}

impl PeerListener {
    /// Refuse (or accept again) subsequent attempts
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Next attempt, accepted or refused
    pub async fn next_attempt(&mut self) -> Option<ConnectAttempt> {
        self.attempts.recv().await
    }

    /// Next accepted connection, skipping refused attempts
    pub async fn accept(&mut self) -> Option<PeerConnection> {
        loop {
            if let Some(peer) = self.attempts.recv().await?.peer {
                return Some(peer);
            }
        }
    }

    /// Attempt already queued, if any
    pub fn try_next_attempt(&mut self) -> Option<ConnectAttempt> {
        self.attempts.try_recv().ok()
    }
}

/// Server side of an in-process connection
#[derive(Debug)]
pub struct PeerConnection {
    to_client: mpsc::Sender<TransportEvent>,
    from_client: mpsc::Receiver<OutboundMessage>,
}

impl PeerConnection {
    /// Push a raw text frame; `false` if the client detached
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client
            .send(TransportEvent::Frame(text.into()))
            .await
            .is_ok()
    }

    /// Push a server frame; `false` if the client detached
    pub async fn send_frame(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(text) => self.send_text(text).await,
            Err(_) => false,
        }
    }

    /// Close from the server side with `code`
    pub async fn close(self, code: u16, reason: &str) -> bool {
        self.to_client
            .send(TransportEvent::Closed {
                code,
                reason: reason.to_string(),
            })
            .await
            .is_ok()
    }

    /// Whether the client stopped listening
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.to_client.is_closed()
    }

    /// Next raw message from the client
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.from_client.recv().await
    }

    /// Next decoded frame from the client; `None` once the client closes
    pub async fn recv_frame(&mut self) -> Option<ClientFrame> {
        match self.from_client.recv().await? {
            OutboundMessage::Text(text) => serde_json::from_str(&text).ok(),
            OutboundMessage::Close => None,
        }
    }

    /// Frame already sent by the client, if any
    pub fn try_recv_frame(&mut self) -> Option<ClientFrame> {
        match self.from_client.try_recv().ok()? {
            OutboundMessage::Text(text) => serde_json::from_str(&text).ok(),
            OutboundMessage::Close => None,
        }
    }
}
