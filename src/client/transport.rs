use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::ClientError;

/// What a live link yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The link ended. `clean` is true only for an intentional close by the
    /// peer; anything else is an unexpected drop.
    Closed { clean: bool, reason: String },
}

/// Opens physical connections for the reconnection manager.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Link>, ClientError>;
}

/// One physical connection.
#[async_trait]
pub trait Link: Send {
    /// Next inbound message. Must be cancel safe.
    async fn recv(&mut self) -> Inbound;
    async fn send(&mut self, text: String) -> Result<(), ClientError>;
    async fn close(&mut self);
}

/// WebSocket connector for the `/ws` session endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Link>, ClientError> {
        debug!(url = %self.url, "opening websocket");
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn recv(&mut self) -> Inbound {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Inbound::Text(text.as_str().to_owned()),
                Some(Ok(Message::Close(frame))) => {
                    let clean = frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal);
                    let reason = frame
                        .map(|f| format!("{}: {}", u16::from(f.code), f.reason.as_str()))
                        .unwrap_or_else(|| "close without frame".to_string());
                    return Inbound::Closed { clean, reason };
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Inbound::Closed {
                        clean: false,
                        reason: e.to_string(),
                    };
                }
                None => {
                    return Inbound::Closed {
                        clean: false,
                        reason: "stream ended".to_string(),
                    };
                }
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), ClientError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::TransportDropped(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
