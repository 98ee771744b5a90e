//! A single debug channel connection with sequential, id-correlated calls.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::message::{Command, InboundFrame};
use crate::types::{ExtractError, ExtractResult};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Decode a websocket message into frame text. `Ok(None)` means "skip this one".
pub(crate) fn frame_text(msg: Message) -> ExtractResult<Option<String>> {
    match msg {
        Message::Text(text) => Ok(Some(text)),
        Message::Binary(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| ExtractError::Transport(format!("binary frame is not UTF-8: {e}"))),
        Message::Close(_) => Err(ExtractError::Transport(
            "channel closed by remote".to_string(),
        )),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
    }
}

/// Connection to one debug target. Ids start at 1 and increase per call.
pub struct ProtocolSession {
    ws: WsStream,
    next_id: u64,
    url: String,
}

impl ProtocolSession {
    /// Open a websocket connection to a target's channel URL.
    pub async fn connect(channel_url: &str) -> ExtractResult<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(channel_url)
            .await
            .map_err(|e| ExtractError::Transport(format!("connect {channel_url}: {e}")))?;
        tracing::debug!(url = channel_url, "debug channel connected");
        Ok(Self {
            ws,
            next_id: 1,
            url: channel_url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Id the next call will use.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Send a command and wait for the frame carrying its id.
    ///
    /// Events and responses to other ids are discarded. Frames that are not
    /// valid JSON are skipped as well, since they cannot be correlated.
    pub async fn call(&mut self, method: &str, params: Option<Value>) -> ExtractResult<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let text = Command::new(id, method, params).to_text()?;
        self.ws.send(Message::Text(text)).await?;

        loop {
            let msg = match self.ws.next().await {
                Some(msg) => msg?,
                None => {
                    return Err(ExtractError::Transport(format!(
                        "channel ended while waiting for {method} (id {id})"
                    )))
                }
            };
            let Some(text) = frame_text(msg)? else {
                continue;
            };
            let frame = match InboundFrame::parse(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!("skipping malformed frame: {e}");
                    continue;
                }
            };
            if !frame.is_response_to(id) {
                tracing::trace!(
                    event = frame.method.as_deref().unwrap_or(""),
                    other_id = ?frame.id,
                    "discarding uncorrelated frame"
                );
                continue;
            }
            return frame.into_result();
        }
    }

    /// Close the connection.
    pub async fn close(mut self) -> ExtractResult<()> {
        match self.ws.close(None).await {
            Ok(()) => Ok(()),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
