//! WebSocket transport used by sessions.
//!
//! Sessions only see the [`Connector`] and [`Connection`] traits, so the
//! lifecycle logic can run against an in-memory transport in tests.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::BridgeError;
use crate::Result;

/// Outcome of one bounded receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A message payload.
    Text(String),
    /// Nothing arrived within the wait.
    Idle,
    /// The peer closed the connection.
    Closed,
}

/// An open upstream connection, owned by exactly one session.
#[async_trait]
pub trait Connection: Send {
    /// Send a text message.
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Wait at most `wait` for the next message.
    async fn receive(&mut self, wait: Duration) -> Result<Frame>;

    /// Close the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Opens upstream connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// [`Connector`] backed by tokio-tungstenite (`ws://` and `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (stream, response) = connect_async(url).await?;
        debug!("WebSocket handshake with {} done: {}", url, response.status());
        Ok(Box::new(TungsteniteConnection {
            stream,
            closed: false,
        }))
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TungsteniteConnection {
    stream: WsStream,
    closed: bool,
}

#[async_trait]
impl Connection for TungsteniteConnection {
    async fn send(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(BridgeError::Transport("connection already closed".into()));
        }
        self.stream.send(Message::text(text.to_string())).await?;
        Ok(())
    }

    async fn receive(&mut self, wait: Duration) -> Result<Frame> {
        if self.closed {
            return Ok(Frame::Closed);
        }

        let next = match tokio::time::timeout(wait, self.stream.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(Frame::Idle),
        };

        match next {
            Some(Ok(Message::Text(text))) => Ok(Frame::Text(text.as_str().to_owned())),
            Some(Ok(Message::Binary(data))) => {
                Ok(Frame::Text(String::from_utf8_lossy(&data).into_owned()))
            }
            Some(Ok(Message::Close(frame))) => {
                debug!("Upstream sent close frame: {:?}", frame);
                Ok(Frame::Closed)
            }
            // Pings are answered by tungstenite on the next read/write.
            Some(Ok(other)) => {
                trace!("Ignoring control frame: {:?}", other);
                Ok(Frame::Idle)
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(Frame::Closed),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.stream.close(None).await {
            Ok(()) => {}
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        // Drain until the peer acknowledges the close.
        while let Some(Ok(_)) = self.stream.next().await {}
        Ok(())
    }
}
