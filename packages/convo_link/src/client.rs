//! Sync Client
//!
//! Single owner of all client state. Wires the connection manager and the
//! session coordinator to an injected [`Transport`], [`TimerScheduler`] and
//! [`CredentialStore`], applying the effects both state machines return.
//!
//! Every entry point runs to completion before the next one starts: the
//! runtime loop feeds transport events, timer firings and UI commands in one
//! at a time, so there is no interleaving to reason about.

use convo_wire::{DomainEvent, PaneId, decode, encode};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionSignal, Phase};
use crate::credentials::CredentialStore;
use crate::directory::Directory;
use crate::effect::{ClientUpdate, Effect, TimerKind, TimerToken};
use crate::error::CommandRejected;
use crate::history::HistoryStore;
use crate::session::{SessionCoordinator, SessionViewState};
use crate::timers::TimerScheduler;
use crate::transport::{CloseCode, Transport, TransportEvent};

/// Commands the UI can issue. All of them require a live connection.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    StartSession { agent_id: Option<String> },
    Attach { session_id: String },
    ViewHistoryOnly { session_id: String },
    LoadMore,
    SendInput { text: String, pane: Option<PaneId> },
    Approve { tool_call_id: String },
    Reject { tool_call_id: String },
    Interrupt,
    PauseDeadloop,
    ResumeDeadloop,
    Refresh,
}

pub struct SyncClient<T, S, C> {
    connection: ConnectionManager,
    session: SessionCoordinator,
    transport: T,
    timers: S,
    credentials: C,
    updates: Vec<ClientUpdate>,
}

impl<T, S, C> SyncClient<T, S, C>
where
    T: Transport,
    S: TimerScheduler,
    C: CredentialStore,
{
    pub fn new(config: &ClientConfig, transport: T, timers: S, credentials: C) -> Self {
        Self {
            connection: ConnectionManager::new(config.backoff),
            session: SessionCoordinator::new(config.session),
            transport,
            timers,
            credentials,
            updates: Vec::new(),
        }
    }

    // ── accessors ───────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.connection.phase()
    }

    pub fn view(&self) -> SessionViewState {
        self.session.view()
    }

    pub fn history(&self) -> &HistoryStore {
        self.session.history()
    }

    pub fn directory(&self) -> &Directory {
        self.session.directory()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn timers(&self) -> &S {
        &self.timers
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut C {
        &mut self.credentials
    }

    /// Take every update published since the last call, in order.
    pub fn drain_updates(&mut self) -> Vec<ClientUpdate> {
        std::mem::take(&mut self.updates)
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    pub fn connect(&mut self) {
        let has_credential = self.credentials.has_credential();
        self.drive(ConnectionSignal::Connect { has_credential });
    }

    pub fn disconnect(&mut self) {
        self.drive(ConnectionSignal::Disconnect);
        let effects = self.session.reset();
        self.run(effects);
    }

    /// The host environment became visible again.
    pub fn foreground(&mut self) {
        if self.connection.is_live() {
            debug!("Foreground while live, resyncing session");
            let effects = self.session.on_foreground();
            self.run(effects);
        } else {
            let has_credential = self.credentials.has_credential();
            self.drive(ConnectionSignal::Foreground { has_credential });
        }
    }

    pub fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                let credential = self.credentials.load();
                self.drive(ConnectionSignal::Opened { credential });
            }
            TransportEvent::Message(frame) => self.handle_frame(&frame),
            TransportEvent::Closed(code) => self.drive(ConnectionSignal::Closed(code)),
        }
    }

    pub fn handle_timer(&mut self, token: TimerToken) {
        match token.kind {
            TimerKind::Reconnect => self.drive(ConnectionSignal::TimerFired(token)),
            TimerKind::Poll | TimerKind::ResyncSafety => {
                let effects = self.session.on_timer(token);
                self.run(effects);
            }
        }
    }

    // ── UI commands ─────────────────────────────────────────────────────

    pub fn execute(&mut self, command: UiCommand) -> Result<(), CommandRejected> {
        if !self.connection.is_live() {
            return Err(CommandRejected::NotConnected);
        }
        let effects = match command {
            UiCommand::StartSession { agent_id } => self.session.start(agent_id),
            UiCommand::Attach { session_id } => self.session.attach(session_id),
            UiCommand::ViewHistoryOnly { session_id } => self.session.view_history_only(session_id),
            UiCommand::LoadMore => self.session.load_more()?,
            UiCommand::SendInput { text, pane } => self.session.send_input(text, pane)?,
            UiCommand::Approve { tool_call_id } => self.session.approve(tool_call_id)?,
            UiCommand::Reject { tool_call_id } => self.session.reject(tool_call_id)?,
            UiCommand::Interrupt => self.session.interrupt()?,
            UiCommand::PauseDeadloop => self.session.pause_deadloop()?,
            UiCommand::ResumeDeadloop => self.session.resume_deadloop()?,
            UiCommand::Refresh => self.session.refresh(),
        };
        self.run(effects);
        Ok(())
    }

    // ── internals ───────────────────────────────────────────────────────

    fn handle_frame(&mut self, frame: &str) {
        let event = match decode(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(code = e.error_code(), "Dropping inbound frame: {}", e);
                return;
            }
        };

        match event {
            DomainEvent::Authenticated { user_id } => {
                debug!("Authenticated as {}", user_id);
                self.drive(ConnectionSignal::Authenticated);
            }
            DomainEvent::AuthenticationFailed { reason } => {
                self.drive(ConnectionSignal::Rejected { reason });
            }
            event if !self.connection.is_live() => {
                debug!("Ignoring {} before authentication", event.event_type());
            }
            event => {
                let effects = self.session.handle_event(event);
                self.run(effects);
            }
        }
    }

    /// Feed a signal to the connection manager and react to the phase change.
    fn drive(&mut self, signal: ConnectionSignal) {
        let mut next = Some(signal);
        while let Some(signal) = next.take() {
            let before = self.connection.phase();
            let effects = self.connection.process(signal);
            next = self.apply(effects);
            self.after_transition(before);
        }
    }

    fn after_transition(&mut self, before: Phase) {
        let after = self.connection.phase();
        if before == after {
            return;
        }
        debug!("Connection {} → {}", before, after);
        self.updates.push(ClientUpdate::Phase(after));
        if after == Phase::Live {
            let effects = self.session.bootstrap();
            self.run(effects);
        } else if before == Phase::Live {
            let effects = self.session.on_connection_lost();
            self.run(effects);
        }
    }

    fn run(&mut self, effects: Vec<Effect>) {
        if let Some(signal) = self.apply(effects) {
            self.drive(signal);
        }
    }

    /// Apply effects in order. A failed `Open` or `Send` is reported back as
    /// the abnormal close it amounts to.
    fn apply(&mut self, effects: Vec<Effect>) -> Option<ConnectionSignal> {
        let mut follow_up = None;
        for effect in effects {
            match effect {
                Effect::Open => {
                    if let Err(e) = self.transport.open() {
                        warn!("Failed to open transport: {}", e);
                        follow_up = Some(ConnectionSignal::Closed(CloseCode::ABNORMAL));
                    }
                }
                Effect::Send(command) => {
                    let name = command.name();
                    match encode(&command) {
                        Ok(frame) => {
                            debug!("→ {}", name);
                            if let Err(e) = self.transport.send(frame) {
                                warn!("Failed to send {}: {}", name, e);
                                if follow_up.is_none() {
                                    self.transport.close(CloseCode::ABNORMAL);
                                    follow_up = Some(ConnectionSignal::Closed(CloseCode::ABNORMAL));
                                }
                            }
                        }
                        Err(e) => warn!("Failed to encode {}: {}", name, e),
                    }
                }
                Effect::Close(code) => self.transport.close(code),
                Effect::Schedule(token, after) => self.timers.schedule(token, after),
                Effect::Cancel(token) => self.timers.cancel(token),
                Effect::ClearCredential => {
                    if let Err(e) = self.credentials.clear() {
                        warn!("Failed to clear credential: {}", e);
                    }
                }
                Effect::Notify(update) => self.updates.push(update),
            }
        }
        follow_up
    }
}
