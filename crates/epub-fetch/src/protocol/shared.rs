//! A debug channel connection shared by concurrent callers.
//!
//! A reader task owns the inbound half and routes each response to the
//! caller waiting on its id. Ids are allocated from one counter, so concurrent
//! calls never share an id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::message::{Command, InboundFrame};
use super::session::{frame_text, WsStream};
use crate::types::{ExtractError, ExtractResult};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<ExtractResult<Value>>>>>;

/// Multiplexed connection to one debug target.
pub struct SharedSession {
    writer: Mutex<SplitSink<WsStream, Message>>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl SharedSession {
    pub async fn connect(channel_url: &str) -> ExtractResult<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(channel_url)
            .await
            .map_err(|e| ExtractError::Transport(format!("connect {channel_url}: {e}")))?;
        let (writer, stream) = ws.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&pending), Arc::clone(&closed)));

        tracing::debug!(url = channel_url, "shared debug channel connected");
        Ok(Self {
            writer: Mutex::new(writer),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    /// Send a command and wait for its correlated response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> ExtractResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&id);
            return Err(ExtractError::Transport("channel already closed".to_string()));
        }

        let text = Command::new(id, method, params).to_text()?;
        if let Err(e) = self.writer.lock().await.send(Message::Text(text)).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        rx.await.map_err(|_| {
            ExtractError::Transport(format!("channel dropped {method} (id {id}) unanswered"))
        })?
    }

    /// Number of calls still awaiting a response.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn close(self) -> ExtractResult<()> {
        let result = self.writer.lock().await.close().await;
        self.reader.abort();
        match result {
            Ok(())
            | Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for SharedSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, pending: Pending, closed: Arc<AtomicBool>) {
    let reason = loop {
        let msg = match stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => break e.to_string(),
            None => break "channel ended".to_string(),
        };
        let text = match frame_text(msg) {
            Ok(Some(text)) => text,
            Ok(None) => continue,
            Err(e) => break e.to_string(),
        };
        let frame = match InboundFrame::parse(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("skipping malformed frame: {e}");
                continue;
            }
        };
        let Some(id) = frame.id else {
            continue;
        };
        match pending.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(frame.into_result());
            }
            None => tracing::trace!(id, "response for unknown id"),
        }
    };

    closed.store(true, Ordering::SeqCst);
    let waiters: Vec<_> = pending.lock().await.drain().collect();
    if !waiters.is_empty() {
        tracing::warn!(count = waiters.len(), "debug channel closed with calls in flight: {reason}");
    }
    for (_, tx) in waiters {
        let _ = tx.send(Err(ExtractError::Transport(reason.clone())));
    }
}
