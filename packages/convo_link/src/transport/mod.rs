//! Transport abstraction.
//!
//! The state machines only see three events: the connection opened, a text
//! frame arrived, or the connection closed with a code. Implementations must
//! never call back into the client; they report events through a channel and
//! the runtime loop feeds them in, one at a time, in delivery order.
//!
//! Submodules:
//! - `websocket`: tokio-tungstenite implementation used by the binary

pub mod websocket;

use crate::error::TransportError;

/// WebSocket-style close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Orderly, user-initiated closure. Never triggers a reconnect.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// Connection lost without a close frame (network failure, open failure).
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    /// The peer closed without giving a code.
    pub const NO_STATUS: CloseCode = CloseCode(1005);

    pub fn is_user_initiated(&self) -> bool {
        *self == Self::NORMAL
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed(CloseCode),
}

/// Non-blocking connection handle driven by the sync client.
///
/// `open` starts connecting and returns immediately; the outcome arrives
/// later as `Opened` or `Closed`. `send` queues a frame on an open
/// connection.
pub trait Transport {
    fn open(&mut self) -> Result<(), TransportError>;
    fn send(&mut self, frame: String) -> Result<(), TransportError>;
    fn close(&mut self, code: CloseCode);
    fn is_open(&self) -> bool;
}
