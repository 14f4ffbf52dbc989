//! WebSocket Transport
//!
//! Connects to the assistant backend with `tokio-tungstenite`. The socket is
//! split into a writer task fed by the outbound channel and a reader task
//! that forwards text frames and reports the close code exactly once.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::traits::{Connection, Connector, OutboundMessage, TransportError, TransportEvent};
use crate::config::ConnectionConfig;
use crate::connection::ABNORMAL_CLOSE_CODE;

/// Close code reported when the peer sent a close frame without a status
const NO_STATUS_CLOSE_CODE: u16 = 1005;

/// [`Connector`] backed by a WebSocket client
#[derive(Clone, Debug)]
pub struct WsConnector {
    connect_timeout: Duration,
    channel_capacity: usize,
}

impl WsConnector {
    /// Create a connector
    #[must_use]
    pub fn new(connect_timeout: Duration, channel_capacity: usize) -> Self {
        Self {
            connect_timeout,
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Create a connector from configuration
    #[must_use]
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(
            Duration::from_millis(config.connect_timeout_ms),
            config.channel_capacity,
        )
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let timeout_ms = u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX);
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(timeout_ms))?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        info!("WebSocket connected");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(self.channel_capacity);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(self.channel_capacity);

        // Writer task
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                match msg {
                    OutboundMessage::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            warn!(error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    OutboundMessage::Close => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client closing".into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
            let _ = sink.close().await;
            debug!("WebSocket writer stopped");
        });

        // Reader task
        tokio::spawn(async move {
            let mut code = ABNORMAL_CLOSE_CODE;
            let mut reason = String::new();

            while let Some(item) = source.next().await {
                match item {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(TransportEvent::Frame(text)).await.is_err() {
                            debug!("Inbound detached; reader stopping");
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        match frame {
                            Some(frame) => {
                                code = u16::from(frame.code);
                                reason = frame.reason.into_owned();
                            }
                            None => code = NO_STATUS_CLOSE_CODE,
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }

            debug!(code, reason = %reason, "WebSocket closed");
            let _ = in_tx.send(TransportEvent::Closed { code, reason }).await;
        });

        Ok(Connection::new(out_tx, in_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        let connector = WsConnector::new(Duration::from_secs(2), 8);
        let result = connector.connect("ws://127.0.0.1:1/ws").await;
        assert!(result.is_err());
    }
}
