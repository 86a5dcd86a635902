//! # Convo Wire
//!
//! Wire protocol and conversation data model for a thin client that keeps a
//! conversation with a remote agent in sync over a persistent connection.
//!
//! ## Overview
//!
//! - [`types`]: conversation entries, panes, remote agents and session records
//! - [`protocol`]: outbound [`ClientCommand`]s and inbound [`DomainEvent`]s,
//!   with [`decode`] / [`encode`]
//! - [`stream`]: translation of the agent's stream-json records into entries
//! - [`history`]: translation of persisted history rows into entries
//!
//! Everything here is pure: no I/O, no timers, no shared state.
//!
//! ## Quick Start
//!
//! ```rust
//! use convo_wire::{ClientCommand, DomainEvent, decode, encode};
//!
//! let frame = encode(&ClientCommand::Authenticate { token: "T".into() }).unwrap();
//! assert!(frame.contains("authenticate"));
//!
//! match decode(r#"{"type":"authenticated","user_id":"U1"}"#).unwrap() {
//!     DomainEvent::Authenticated { user_id } => assert_eq!(user_id, "U1"),
//!     _ => unreachable!(),
//! }
//! ```

pub mod error;
pub mod history;
pub mod protocol;
pub mod stream;
pub mod types;

pub use error::DecodeError;
pub use history::{HistoryRow, rows_to_entries};
pub use protocol::{ClientCommand, DomainEvent, decode, encode};
pub use stream::{StreamRecord, StreamTranslator};
pub use types::{
    AgentStatus, ConversationEntry, EntryKind, PaneId, PaneTag, RemoteAgent, Role, SessionRecord,
    SessionStatus, TaggedEntry, parse_timestamp,
};
