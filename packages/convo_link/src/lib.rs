//! # Convo Link
//!
//! Client-side connection and session-state manager for a remote coding
//! agent. Keeps a local, ordered, de-duplicated copy of the conversation in
//! sync with the server over one persistent connection, across reconnects,
//! paged history loads and live pushes.
//!
//! ## Overview
//!
//! - [`connection`]: transport lifecycle, authentication and reconnect backoff
//! - [`session`]: which session is the subject of the UI, and what to do
//!   with each inbound event
//! - [`history`]: per-pane ordered entry store with pagination
//! - [`router`]: single-pane / dual-pane routing
//! - [`directory`]: remote agents and persisted sessions
//! - [`client`]: the [`SyncClient`] that owns everything and applies effects
//! - [`runtime`]: tokio task driving a `SyncClient` over WebSocket
//!
//! The state machines never perform I/O. They return [`Effect`]s, which the
//! `SyncClient` applies against an injected [`Transport`],
//! [`TimerScheduler`] and [`CredentialStore`]. Tests drive the whole client
//! with fakes and no runtime at all.

pub mod client;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod directory;
pub mod effect;
pub mod error;
pub mod history;
pub mod router;
pub mod runtime;
pub mod session;
pub mod timers;
pub mod transport;

pub use client::{SyncClient, UiCommand};
pub use config::{ClientConfig, ConvoPaths, FileConfig, load_config};
pub use connection::{BackoffPolicy, ConnectionManager, ConnectionSignal, DisconnectReason, Phase};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use directory::{Directory, ProjectView};
pub use effect::{ClientUpdate, Effect, TimerKind, TimerToken};
pub use error::{ClientError, CommandRejected, ConfigError, CredentialError, TransportError};
pub use history::{HistoryStore, Pane};
pub use router::{PaneRouter, Routed};
pub use runtime::{ClientHandle, Snapshot, spawn_client};
pub use session::{SessionCoordinator, SessionPhase, SessionSettings, SessionViewState};
pub use timers::{TimerScheduler, TokioTimers};
pub use transport::{CloseCode, Transport, TransportEvent};
