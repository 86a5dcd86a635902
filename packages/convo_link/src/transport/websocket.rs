//! WebSocket transport over tokio-tungstenite.
//!
//! Each `open` spawns a connection task tagged with a fresh generation.
//! Events are reported on a channel together with that generation; the
//! runtime drops events whose generation is no longer current, so a
//! connection we already abandoned can never disturb the state machines.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Message, protocol::CloseFrame};
use tracing::{debug, warn};

use super::{CloseCode, Transport, TransportEvent};
use crate::error::TransportError;

/// A transport event stamped with the connection generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

enum Outbound {
    Frame(String),
    Close(CloseCode),
}

pub struct WsTransport {
    url: String,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self {
            url: url.into(),
            events,
            generation: 0,
            outbound: None,
        }
    }

    /// Generation of the connection whose events are still meaningful.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Transport for WsTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        if self.outbound.is_some() {
            self.close(CloseCode::NORMAL);
        }
        self.generation += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        debug!("Opening connection {} to {}", self.generation, self.url);
        runtime.spawn(run_connection(
            self.url.clone(),
            self.generation,
            rx,
            self.events.clone(),
        ));
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        tx.send(Outbound::Frame(frame))
            .map_err(|_| TransportError::TaskGone)
    }

    fn close(&mut self, code: CloseCode) {
        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(Outbound::Close(code));
        }
        // Whatever the closed connection still reports is stale.
        self.generation += 1;
    }

    fn is_open(&self) -> bool {
        // The connection task owns the receiver and drops it on exit.
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

async fn run_connection(
    url: String,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(ConnectionEvent { generation, event });
    };

    let ws_stream = match tokio_tungstenite::connect_async(&url).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            match TransportError::from_tungstenite(e) {
                TransportError::Unavailable => debug!("Server at {} is unavailable", url),
                other => warn!("Connection to {} failed: {}", url, other),
            }
            emit(TransportEvent::Closed(CloseCode::ABNORMAL));
            return;
        }
    };
    emit(TransportEvent::Opened);

    let (mut ws_write, mut ws_read) = ws_stream.split();
    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        warn!("Send failed on connection {}: {}", generation, e);
                        emit(TransportEvent::Closed(CloseCode::ABNORMAL));
                        return;
                    }
                }
                Some(Outbound::Close(code)) => {
                    let frame = CloseFrame {
                        code: code.0.into(),
                        reason: "".into(),
                    };
                    let _ = ws_write.send(Message::Close(Some(frame))).await;
                    let _ = ws_write.close().await;
                    emit(TransportEvent::Closed(code));
                    return;
                }
                None => {
                    let _ = ws_write.close().await;
                    return;
                }
            },
            msg = ws_read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| CloseCode(u16::from(f.code)))
                        .unwrap_or(CloseCode::NO_STATUS);
                    debug!("Server closed connection {} with {:?}", generation, code);
                    emit(TransportEvent::Closed(code));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Connection {} lost: {}", generation, e);
                    emit(TransportEvent::Closed(CloseCode::ABNORMAL));
                    return;
                }
                None => {
                    emit(TransportEvent::Closed(CloseCode::ABNORMAL));
                    return;
                }
            },
        }
    }
}
