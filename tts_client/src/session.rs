//! Duplex sessions: one live connection per synthesis stream.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use tts_core::{decode_frame, Frame, FrameKind};

use crate::error::TtsError;

/// A bidirectional connection to the synthesis server.
///
/// `send` and `receive` may be awaited concurrently from different
/// activities of the same stream.
#[async_trait]
pub trait DuplexSession: Send + Sync {
    async fn send(&self, payload: String) -> Result<(), TtsError>;

    /// Next inbound frame. `Frame::Close` once the server has closed.
    /// Malformed control frames come back as `TtsError::Protocol` and
    /// the session stays usable.
    async fn receive(&self) -> Result<Frame, TtsError>;

    /// Idempotent and best-effort.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens duplex sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, timeout: Duration) -> Result<Box<dyn DuplexSession>, TtsError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the streaming WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SessionConnector for WsConnector {
    async fn connect(&self, timeout: Duration) -> Result<Box<dyn DuplexSession>, TtsError> {
        debug!("Connecting to {}", self.url());
        let (ws, _response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(self.url()))
                .await
                .map_err(|_| TtsError::Timeout)??;
        Ok(Box::new(WsSession::new(ws)))
    }
}

pub struct WsSession {
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: Mutex<SplitStream<WsStream>>,
    closed: AtomicBool,
}

impl WsSession {
    fn new(ws: WsStream) -> Self {
        let (writer, reader) = ws.split();
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DuplexSession for WsSession {
    async fn send(&self, payload: String) -> Result<(), TtsError> {
        if self.is_closed() {
            return Err(TtsError::Connection("session is closed".to_string()));
        }
        let mut writer = self.writer.lock().await;
        writer.send(Message::text(payload)).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Frame, TtsError> {
        let mut reader = self.reader.lock().await;
        loop {
            let msg = match reader.next().await {
                None => return Ok(Frame::Close),
                Some(Ok(msg)) => msg,
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                    return Ok(Frame::Close)
                }
                Some(Err(e)) => return Err(e.into()),
            };

            let frame = match msg {
                Message::Text(text) => decode_frame(FrameKind::Text, text.as_bytes())?,
                Message::Binary(data) => decode_frame(FrameKind::Binary, &data)?,
                Message::Close(_) => Frame::Close,
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Ok(frame);
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!("Ignoring error while closing session: {e}");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
