//! WebSocket link to the interview service.
//!
//! ```text
//!   send_segment ──► unbounded mpsc ──► writer task ──► ws sink
//!                                                        │
//!   on_event(Reply | Failed) ◄── reader task ◄── ws stream
//! ```
//!
//! Segments are written strictly in the order they were queued; the writer
//! never merges or reorders them.  `send_segment` only queues: delivery is
//! observed through the next [`TransportEvent::Reply`], and write failures
//! arrive later as [`TransportEvent::Failed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use super::message::{parse_reply, OutboundMessage, Reply};

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("could not connect to interview service: {0}")]
    Connect(String),

    #[error("failed to send segment: {0}")]
    Send(String),

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("malformed message: {0}")]
    Decode(String),

    #[error("unexpected message: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Terminal errors end the session; the rest only cost the current turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Closed(_))
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Something the transport observed after the fact.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Reply(Reply),
    Failed(TransportError),
}

/// Receives transport events; called from the transport's own tasks.
pub type TransportCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

pub trait Transport: Send {
    /// Queue a segment for delivery.  `Ok` means queued, not delivered.
    fn send_segment(&mut self, message: OutboundMessage) -> Result<(), TransportError>;

    /// Close the connection.  Idempotent; no events are reported afterwards.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// WsTransport
// ---------------------------------------------------------------------------

pub struct WsTransport {
    outbound: Option<mpsc::UnboundedSender<String>>,
    closing: Arc<AtomicBool>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl WsTransport {
    /// Open the socket and spawn the reader and writer tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(
        url: &str,
        timeout: Duration,
        on_event: TransportCallback,
    ) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::Connect(format!("{url}: {e}")))?;

        log::info!("transport: connecting to {url}");
        let (ws_stream, response) = match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(TransportError::Connect(e.to_string())),
            Err(_) => {
                return Err(TransportError::Connect(format!(
                    "timed out after {}s",
                    timeout.as_secs_f32()
                )))
            }
        };
        log::info!("transport: connected (status {})", response.status());

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let closing = Arc::new(AtomicBool::new(false));

        let writer_events = Arc::clone(&on_event);
        let writer_closing = Arc::clone(&closing);
        let writer = tokio::spawn(async move {
            let mut sent = 0usize;
            while let Some(text) = rx.recv().await {
                let len = text.len();
                match write.send(Message::Text(text.into())).await {
                    Ok(()) => {
                        sent += 1;
                        log::debug!("transport: sent segment #{sent} ({len} bytes of json)");
                    }
                    Err(e) => {
                        log::warn!("transport: send failed: {e}");
                        if !writer_closing.load(Ordering::Acquire) {
                            writer_events(TransportEvent::Failed(TransportError::Send(
                                e.to_string(),
                            )));
                        }
                    }
                }
            }
            let _ = write.close().await;
            log::debug!("transport: writer finished after {sent} segments");
        });

        let reader_closing = Arc::clone(&closing);
        let reader = tokio::spawn(async move {
            let report = |event: TransportEvent| {
                if !reader_closing.load(Ordering::Acquire) {
                    on_event(event);
                }
            };

            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match parse_reply(text.as_str()) {
                        Ok(Some(reply)) => {
                            log::debug!(
                                "transport: reply for step {} (finished: {})",
                                reply.interview_step,
                                reply.finished
                            );
                            report(TransportEvent::Reply(reply));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            log::warn!("transport: {e}");
                            report(TransportEvent::Failed(e));
                        }
                    },
                    Some(Ok(Message::Binary(data))) => {
                        report(TransportEvent::Failed(TransportError::Protocol(format!(
                            "binary frame of {} bytes",
                            data.len()
                        ))));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) => format!("server closed ({}: {})", f.code, f.reason),
                            None => "server closed".to_string(),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_string(),
                }
            };

            if reader_closing.load(Ordering::Acquire) {
                log::debug!("transport: reader finished ({reason})");
            } else {
                log::error!("transport: {reason}");
                on_event(TransportEvent::Failed(TransportError::Closed(reason)));
            }
        });

        Ok(Self {
            outbound: Some(tx),
            closing,
            writer: Some(writer),
            reader: Some(reader),
        })
    }
}

impl Transport for WsTransport {
    fn send_segment(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        let json = message.to_json()?;
        let tx = self
            .outbound
            .as_ref()
            .ok_or_else(|| TransportError::Closed("transport already closed".into()))?;
        tx.send(json)
            .map_err(|_| TransportError::Closed("writer task stopped".into()))
    }

    fn close(&mut self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("transport: closing");
        // Dropping the sender lets the writer flush what is queued, then
        // close the socket.
        self.outbound = None;
        self.writer.take();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
