//! Effects and updates emitted by the state machines.
//!
//! The connection manager and session coordinator never perform I/O. Each
//! operation returns the `Effect`s it wants applied, in order; the
//! [`SyncClient`](crate::client::SyncClient) applies them against its
//! transport, timer scheduler and credential store.

use std::time::Duration;

use convo_wire::{ClientCommand, ConversationEntry};

use crate::connection::Phase;
use crate::history::Pane;
use crate::transport::CloseCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Reconnect,
    Poll,
    ResyncSafety,
}

/// Identifies one arming of a timer. A fired token whose generation is not
/// the one currently armed for its kind is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Hands out tokens with increasing generations.
#[derive(Debug, Default)]
pub struct TimerTokens {
    next: u64,
}

impl TimerTokens {
    pub fn issue(&mut self, kind: TimerKind) -> TimerToken {
        self.next += 1;
        TimerToken {
            kind,
            generation: self.next,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Open,
    Send(ClientCommand),
    Close(CloseCode),
    Schedule(TimerToken, Duration),
    Cancel(TimerToken),
    ClearCredential,
    Notify(ClientUpdate),
}

/// Observable state changes, published to the UI in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientUpdate {
    Phase(Phase),
    EntryAdded {
        pane: Pane,
        entry: ConversationEntry,
    },
    /// A server echo confirmed an optimistic entry.
    EntryConfirmed {
        id: String,
    },
    HistoryReplaced,
    /// Older entries were inserted at the head of a pane. `inserted` lets a
    /// viewport keep its anchor.
    HistoryPrepended {
        pane: Pane,
        inserted: usize,
    },
    DualPaneEntered,
    ViewChanged,
    DirectoryChanged,
    LoginRequired {
        reason: String,
    },
    ReconnectGaveUp,
    ServerError {
        message: String,
    },
}
