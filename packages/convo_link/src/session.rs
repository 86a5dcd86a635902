//! Session Coordinator
//!
//! Tracks which remote session is the subject of the UI and keeps the local
//! history, pane routing and directory consistent with the server.
//!
//! ## Session phases
//!
//! - `NoSession`: nothing selected. `start` sends `start_session` and waits
//!   for `session_started` to supply an id, which moves to `Pending`.
//! - `Pending(id)`: created, agent not yet connected. `session_status:
//!   connected` promotes it to `Attached`.
//! - `Attached(id)`: receiving live pushes. `session_status: ended` demotes it
//!   to `HistoryOnly`.
//! - `HistoryOnly(id)`: static history. Background polling promotes it to
//!   `Attached` as soon as a live agent reports it as its active session.
//!
//! Attaching to a different id clears all panes first; re-attaching to the
//! same id keeps them, so a reconnect-driven re-attach does not lose
//! dual-pane state.
//!
//! ## Isolation
//!
//! Live pushes carrying a session id other than the tracked one are
//! discarded. `output` carries no id and is only accepted while attached.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use convo_wire::{
    ClientCommand, ConversationEntry, DomainEvent, EntryKind, HistoryRow, PaneId, PaneTag, Role,
    SessionStatus, StreamTranslator, TaggedEntry, rows_to_entries,
};
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::effect::{ClientUpdate, Effect, TimerKind, TimerToken, TimerTokens};
use crate::error::CommandRejected;
use crate::history::{HistoryStore, Pane};
use crate::router::PaneRouter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    NoSession,
    Pending(String),
    Attached(String),
    HistoryOnly(String),
}

impl SessionPhase {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionPhase::NoSession => None,
            SessionPhase::Pending(id)
            | SessionPhase::Attached(id)
            | SessionPhase::HistoryOnly(id) => Some(id),
        }
    }

    /// Live pushes for this session are flowing.
    pub fn is_attached(&self) -> bool {
        matches!(self, SessionPhase::Pending(_) | SessionPhase::Attached(_))
    }
}

/// Snapshot of the session view, for observers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionViewState {
    pub phase: SessionPhase,
    pub current_session_id: Option<String>,
    pub is_attached: bool,
    pub is_dual_pane: bool,
    pub is_loading_more: bool,
    pub has_more_history: bool,
    /// A reconnect- or foreground-driven re-attach is in flight.
    pub is_resyncing: bool,
    /// `start` was sent and no session id has arrived yet.
    pub awaiting_start: bool,
    pub deadloop_paused: Option<bool>,
    pub remote_status: Option<SessionStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub page_size: u32,
    pub poll_interval: Duration,
    pub resync_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            poll_interval: Duration::from_secs(3),
            resync_timeout: Duration::from_secs(5),
        }
    }
}

/// A locally shown user input waiting for the server's `user_input` echo.
#[derive(Debug)]
struct PendingEcho {
    id: String,
    text: String,
    pane: Option<PaneId>,
}

#[derive(Debug)]
pub struct SessionCoordinator {
    settings: SessionSettings,
    phase: SessionPhase,
    awaiting_start: bool,
    history: HistoryStore,
    router: PaneRouter,
    directory: Directory,
    translator: StreamTranslator,
    is_loading_more: bool,
    is_resyncing: bool,
    reattach_when_live: bool,
    deadloop_paused: Option<bool>,
    remote_status: Option<SessionStatus>,
    pending_echoes: VecDeque<PendingEcho>,
    poll_timer: Option<TimerToken>,
    resync_timer: Option<TimerToken>,
    tokens: TimerTokens,
}

impl SessionCoordinator {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            phase: SessionPhase::NoSession,
            awaiting_start: false,
            history: HistoryStore::new(),
            router: PaneRouter::new(),
            directory: Directory::new(),
            translator: StreamTranslator::new(),
            is_loading_more: false,
            is_resyncing: false,
            reattach_when_live: false,
            deadloop_paused: None,
            remote_status: None,
            pending_echoes: VecDeque::new(),
            poll_timer: None,
            resync_timer: None,
            tokens: TimerTokens::default(),
        }
    }

    // ── accessors ───────────────────────────────────────────────────────

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn view(&self) -> SessionViewState {
        SessionViewState {
            phase: self.phase.clone(),
            current_session_id: self.phase.session_id().map(str::to_string),
            is_attached: self.phase.is_attached(),
            is_dual_pane: self.router.is_dual_pane(),
            is_loading_more: self.is_loading_more,
            has_more_history: self.history.has_more(),
            is_resyncing: self.is_resyncing,
            awaiting_start: self.awaiting_start,
            deadloop_paused: self.deadloop_paused,
            remote_status: self.remote_status.clone(),
        }
    }

    // ── UI commands ─────────────────────────────────────────────────────

    /// Ask the server for a new session, optionally on a specific agent.
    pub fn start(&mut self, agent_id: Option<String>) -> Vec<Effect> {
        let mut effects = self.reset_subject();
        self.phase = SessionPhase::NoSession;
        self.awaiting_start = true;
        info!("Starting new session (agent: {:?})", agent_id);
        effects.push(Effect::Send(ClientCommand::StartSession {
            cli_client_id: agent_id,
        }));
        effects.push(Effect::Notify(ClientUpdate::ViewChanged));
        effects
    }

    pub fn attach(&mut self, session_id: String) -> Vec<Effect> {
        let same = self.phase.session_id() == Some(session_id.as_str());
        let mut effects = if same {
            debug!("Re-attaching to {}, keeping history", session_id);
            Vec::new()
        } else {
            info!("Attaching to session {}", session_id);
            self.reset_subject()
        };
        self.awaiting_start = false;
        self.phase = SessionPhase::Attached(session_id.clone());
        effects.push(Effect::Send(ClientCommand::AttachSession { session_id }));
        effects.push(Effect::Notify(ClientUpdate::ViewChanged));
        effects
    }

    /// Show a session's stored history without subscribing to it.
    pub fn view_history_only(&mut self, session_id: String) -> Vec<Effect> {
        info!("Viewing history of session {}", session_id);
        let mut effects = self.reset_subject();
        self.awaiting_start = false;
        self.phase = SessionPhase::HistoryOnly(session_id.clone());
        effects.push(Effect::Send(ClientCommand::GetSessionMessages {
            session_id,
            limit: Some(self.settings.page_size),
            before_id: None,
        }));
        effects.push(Effect::Notify(ClientUpdate::ViewChanged));
        effects
    }

    /// Request the page older than everything loaded, in any pane.
    pub fn load_more(&mut self) -> Result<Vec<Effect>, CommandRejected> {
        let session_id = self
            .phase
            .session_id()
            .ok_or(CommandRejected::NoSession)?
            .to_string();
        if self.is_loading_more {
            return Err(CommandRejected::AlreadyLoading);
        }
        if !self.history.has_more() {
            return Err(CommandRejected::NoMoreHistory);
        }
        let cursor = self
            .history
            .oldest_entry_across_panes()
            .ok_or(CommandRejected::NoMoreHistory)?
            .id
            .clone();

        debug!("Loading history of {} before {}", session_id, cursor);
        self.is_loading_more = true;
        Ok(vec![
            Effect::Send(ClientCommand::GetSessionMessages {
                session_id,
                limit: Some(self.settings.page_size),
                before_id: Some(cursor),
            }),
            Effect::Notify(ClientUpdate::ViewChanged),
        ])
    }

    /// Send user input and show it immediately.
    pub fn send_input(
        &mut self,
        text: String,
        pane: Option<PaneId>,
    ) -> Result<Vec<Effect>, CommandRejected> {
        if text.trim().is_empty() {
            return Err(CommandRejected::EmptyInput);
        }
        self.require_attached()?;

        let target = self.router.place(pane);
        let entry = ConversationEntry::local(Role::User, text.clone(), Utc::now());
        self.pending_echoes.push_back(PendingEcho {
            id: entry.id.clone(),
            text: text.clone(),
            pane,
        });

        let mut effects = vec![Effect::Send(ClientCommand::Input {
            text,
            pane_type: pane,
        })];
        self.push_entry(entry, target, &mut effects);
        Ok(effects)
    }

    pub fn approve(&mut self, tool_call_id: String) -> Result<Vec<Effect>, CommandRejected> {
        self.require_attached()?;
        Ok(vec![Effect::Send(ClientCommand::Approve { tool_call_id })])
    }

    pub fn reject(&mut self, tool_call_id: String) -> Result<Vec<Effect>, CommandRejected> {
        self.require_attached()?;
        Ok(vec![Effect::Send(ClientCommand::Reject { tool_call_id })])
    }

    /// Interrupt the agent's current work.
    pub fn interrupt(&mut self) -> Result<Vec<Effect>, CommandRejected> {
        self.require_attached()?;
        Ok(vec![Effect::Send(ClientCommand::Signal {
            signal: "SIGINT".to_string(),
        })])
    }

    pub fn pause_deadloop(&mut self) -> Result<Vec<Effect>, CommandRejected> {
        self.require_attached()?;
        Ok(vec![Effect::Send(ClientCommand::PauseDeadloop)])
    }

    pub fn resume_deadloop(&mut self) -> Result<Vec<Effect>, CommandRejected> {
        self.require_attached()?;
        Ok(vec![Effect::Send(ClientCommand::ResumeDeadloop)])
    }

    /// Refresh the agent and session listings.
    pub fn refresh(&self) -> Vec<Effect> {
        vec![
            Effect::Send(ClientCommand::ListCliClients),
            Effect::Send(ClientCommand::ListSessions),
        ]
    }

    // ── connection lifecycle ────────────────────────────────────────────

    /// Runs once per successful authentication.
    pub fn bootstrap(&mut self) -> Vec<Effect> {
        let mut effects = self.refresh();
        effects.extend(self.start_polling());
        if std::mem::take(&mut self.reattach_when_live) {
            if let Some(id) = self.phase.session_id().map(str::to_string) {
                effects.extend(self.resync(id));
            }
        }
        effects
    }

    /// The connection left `Live`. Anything in flight is lost.
    pub fn on_connection_lost(&mut self) -> Vec<Effect> {
        let mut effects = self.stop_timers();
        self.is_resyncing = false;
        self.is_loading_more = false;
        self.reattach_when_live = self.phase.is_attached();
        if self.awaiting_start {
            warn!("Connection lost before the new session was assigned");
            self.awaiting_start = false;
        }
        effects.push(Effect::Notify(ClientUpdate::ViewChanged));
        effects
    }

    /// Returned to the foreground while the connection is still live.
    pub fn on_foreground(&mut self) -> Vec<Effect> {
        let mut effects = self.refresh();
        if self.phase.is_attached() {
            if let Some(id) = self.phase.session_id().map(str::to_string) {
                effects.extend(self.resync(id));
            }
        }
        effects
    }

    /// User disconnect: forget the subject entirely.
    pub fn reset(&mut self) -> Vec<Effect> {
        let mut effects = self.stop_timers();
        effects.extend(self.reset_subject());
        self.phase = SessionPhase::NoSession;
        self.awaiting_start = false;
        self.reattach_when_live = false;
        effects.push(Effect::Notify(ClientUpdate::ViewChanged));
        effects
    }

    pub fn on_timer(&mut self, token: TimerToken) -> Vec<Effect> {
        match token.kind {
            TimerKind::Poll if self.poll_timer == Some(token) => {
                let mut effects = self.refresh();
                effects.extend(self.start_polling());
                effects
            }
            TimerKind::ResyncSafety if self.resync_timer == Some(token) => {
                self.resync_timer = None;
                if self.is_resyncing {
                    debug!("Resync safety timeout, clearing flag");
                    self.is_resyncing = false;
                    return vec![Effect::Notify(ClientUpdate::ViewChanged)];
                }
                Vec::new()
            }
            _ => {
                debug!("Ignoring stale timer {:?}", token);
                Vec::new()
            }
        }
    }

    // ── inbound events ──────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: DomainEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            DomainEvent::CliClients { clients } => {
                self.directory.replace_agents(clients);
                effects.push(Effect::Notify(ClientUpdate::DirectoryChanged));
                if let SessionPhase::HistoryOnly(id) = &self.phase {
                    if self.directory.live_agent_for(id).is_some() {
                        info!("Session {} became live, attaching", id);
                        let id = id.clone();
                        effects.extend(self.attach(id));
                    }
                }
            }
            DomainEvent::Sessions { sessions } => {
                self.directory.replace_sessions(sessions);
                effects.push(Effect::Notify(ClientUpdate::DirectoryChanged));
            }
            DomainEvent::SessionStarted { session_id } => {
                if self.awaiting_start {
                    info!("Session {} started", session_id);
                    self.awaiting_start = false;
                    self.phase = SessionPhase::Pending(session_id);
                    effects.push(Effect::Notify(ClientUpdate::ViewChanged));
                } else if self.is_current(&session_id) {
                    effects.extend(self.finish_resync());
                } else {
                    debug!("Ignoring session_started for untracked {}", session_id);
                }
            }
            DomainEvent::SessionStatus { status } => {
                if self.phase.session_id().is_none() {
                    debug!("Ignoring session_status {:?} with no session", status);
                    return effects;
                }
                self.phase = match (std::mem::replace(&mut self.phase, SessionPhase::NoSession), &status) {
                    (SessionPhase::Pending(id), SessionStatus::Connected) => {
                        info!("Session {} connected", id);
                        SessionPhase::Attached(id)
                    }
                    (SessionPhase::Attached(id), SessionStatus::Ended) => {
                        info!("Session {} ended", id);
                        SessionPhase::HistoryOnly(id)
                    }
                    (phase, _) => phase,
                };
                self.remote_status = Some(status);
                effects.push(Effect::Notify(ClientUpdate::ViewChanged));
            }
            DomainEvent::Output {
                content,
                role,
                kind,
                tag,
            } => {
                if !self.phase.is_attached() {
                    debug!("Discarding output while not attached");
                    return effects;
                }
                let entry = ConversationEntry::local(role, content, Utc::now()).with_kind(kind);
                self.route_entry(entry, tag.as_ref(), &mut effects);
            }
            DomainEvent::StreamMessage {
                session_id,
                record,
                tag,
            } => {
                if !self.is_current(&session_id) {
                    debug!("Discarding stream_message for other session {}", session_id);
                    return effects;
                }
                for entry in self.translator.translate(record, Utc::now()) {
                    self.route_entry(entry, tag.as_ref(), &mut effects);
                }
            }
            DomainEvent::UserInput {
                session_id,
                text,
                tag,
            } => {
                if !self.is_current(&session_id) {
                    debug!("Discarding user_input for other session {}", session_id);
                    return effects;
                }
                self.user_input(text, tag, &mut effects);
            }
            DomainEvent::SessionMessages {
                session_id,
                rows,
                has_more,
            } => {
                if !self.is_current(&session_id) {
                    debug!("Discarding session_messages for other session {}", session_id);
                    return effects;
                }
                self.session_messages(&rows, has_more, &mut effects);
                effects.extend(self.finish_resync());
            }
            DomainEvent::DeadloopStatus { is_paused } => {
                self.deadloop_paused = Some(is_paused);
                effects.push(Effect::Notify(ClientUpdate::ViewChanged));
            }
            DomainEvent::Error { message } => {
                warn!("Server error: {}", message);
                let entry = ConversationEntry::local(Role::System, message.clone(), Utc::now())
                    .with_kind(EntryKind::Error);
                self.push_entry(entry, Pane::Main, &mut effects);
                if self.is_loading_more {
                    self.is_loading_more = false;
                    effects.push(Effect::Notify(ClientUpdate::ViewChanged));
                }
                effects.push(Effect::Notify(ClientUpdate::ServerError { message }));
            }
            DomainEvent::Unknown { event_type, .. } => {
                debug!("Ignoring unknown event type {}", event_type);
            }
            DomainEvent::Authenticated { .. } | DomainEvent::AuthenticationFailed { .. } => {
                debug!("Authentication event reached the session coordinator");
            }
        }
        effects
    }

    // ── internals ───────────────────────────────────────────────────────

    fn is_current(&self, session_id: &str) -> bool {
        self.phase.session_id() == Some(session_id)
    }

    fn require_attached(&self) -> Result<(), CommandRejected> {
        match &self.phase {
            SessionPhase::Pending(_) | SessionPhase::Attached(_) => Ok(()),
            SessionPhase::HistoryOnly(_) => Err(CommandRejected::SessionNotActive),
            SessionPhase::NoSession => Err(CommandRejected::NoSession),
        }
    }

    /// Clear everything tied to the current subject: panes, routing mode,
    /// tool-name memory, pending echoes and per-session flags.
    fn reset_subject(&mut self) -> Vec<Effect> {
        self.history.clear();
        self.router.reset();
        self.translator.reset();
        self.pending_echoes.clear();
        self.is_loading_more = false;
        self.deadloop_paused = None;
        self.remote_status = None;
        let mut effects = self.cancel_resync();
        effects.push(Effect::Notify(ClientUpdate::HistoryReplaced));
        effects
    }

    /// Re-attach to `session_id` and mark the view as resyncing until the
    /// server answers or the safety timer fires.
    fn resync(&mut self, session_id: String) -> Vec<Effect> {
        let mut effects = self.cancel_resync();
        self.is_resyncing = true;
        let token = self.tokens.issue(TimerKind::ResyncSafety);
        self.resync_timer = Some(token);
        effects.push(Effect::Schedule(token, self.settings.resync_timeout));
        effects.extend(self.attach(session_id));
        effects
    }

    fn finish_resync(&mut self) -> Vec<Effect> {
        if !self.is_resyncing {
            return Vec::new();
        }
        let mut effects = self.cancel_resync();
        effects.push(Effect::Notify(ClientUpdate::ViewChanged));
        effects
    }

    fn cancel_resync(&mut self) -> Vec<Effect> {
        self.is_resyncing = false;
        self.resync_timer
            .take()
            .map(Effect::Cancel)
            .into_iter()
            .collect()
    }

    fn start_polling(&mut self) -> Vec<Effect> {
        let mut effects: Vec<Effect> = self.poll_timer.take().map(Effect::Cancel).into_iter().collect();
        let token = self.tokens.issue(TimerKind::Poll);
        self.poll_timer = Some(token);
        effects.push(Effect::Schedule(token, self.settings.poll_interval));
        effects
    }

    fn stop_timers(&mut self) -> Vec<Effect> {
        let mut effects: Vec<Effect> = self.poll_timer.take().map(Effect::Cancel).into_iter().collect();
        effects.extend(self.cancel_resync());
        effects
    }

    fn route_entry(&mut self, entry: ConversationEntry, tag: Option<&PaneTag>, effects: &mut Vec<Effect>) {
        let routed = self.router.route(tag);
        if routed.entered_dual_pane {
            info!("Entering dual-pane mode");
            effects.push(Effect::Notify(ClientUpdate::DualPaneEntered));
        }
        self.push_entry(entry, routed.pane, effects);
    }

    fn push_entry(&mut self, entry: ConversationEntry, pane: Pane, effects: &mut Vec<Effect>) {
        let id = entry.id.clone();
        if !self.history.append(entry, pane) {
            debug!("Dropping duplicate entry {}", id);
            return;
        }
        if let Some(stored) = self.history.entries(pane).back() {
            effects.push(Effect::Notify(ClientUpdate::EntryAdded {
                pane,
                entry: stored.clone(),
            }));
        }
    }

    fn user_input(&mut self, text: String, tag: Option<PaneTag>, effects: &mut Vec<Effect>) {
        let echoed_pane = tag.as_ref().and_then(PaneTag::pane);
        let confirmed = self
            .pending_echoes
            .iter()
            .position(|p| p.text == text && (p.pane.is_none() || p.pane == echoed_pane));

        match confirmed {
            Some(index) => {
                if let Some(echo) = self.pending_echoes.remove(index) {
                    if self.history.contains(&echo.id) {
                        debug!("Input {} confirmed by server echo", echo.id);
                        effects.push(Effect::Notify(ClientUpdate::EntryConfirmed { id: echo.id }));
                    } else {
                        debug!("Echo for input {} already shown from history", echo.id);
                    }
                }
            }
            None => {
                let entry = ConversationEntry::local(Role::User, text, Utc::now());
                self.route_entry(entry, tag.as_ref(), effects);
            }
        }
    }

    /// A replacing page drops the optimistic entries. Echoes whose input is
    /// already persisted in the page stay pending so the late `user_input`
    /// is swallowed; the rest are forgotten and their echo appends normally.
    fn retain_persisted_echoes(&mut self, page: &[TaggedEntry]) {
        let mut persisted: Vec<&str> = page
            .iter()
            .rev()
            .filter(|t| t.entry.role == Role::User)
            .map(|t| t.entry.content.as_str())
            .collect();
        self.pending_echoes
            .retain(|echo| match persisted.iter().position(|text| *text == echo.text) {
                Some(index) => {
                    persisted.remove(index);
                    true
                }
                None => false,
            });
    }

    fn session_messages(&mut self, rows: &[HistoryRow], has_more: bool, effects: &mut Vec<Effect>) {
        let tagged = rows_to_entries(rows, Utc::now());
        let continuation = std::mem::take(&mut self.is_loading_more);
        if !continuation {
            self.history.clear();
            self.retain_persisted_echoes(&tagged);
        }

        let (batches, entered) = self.router.split_batch(tagged);
        if entered {
            info!("Entering dual-pane mode");
            effects.push(Effect::Notify(ClientUpdate::DualPaneEntered));
        }
        for (pane, batch) in batches {
            let inserted = self.history.prepend(batch, has_more, pane);
            if continuation {
                effects.push(Effect::Notify(ClientUpdate::HistoryPrepended { pane, inserted }));
            }
        }
        self.history.set_has_more(has_more);

        if continuation {
            debug!("Loaded {} older rows, has_more={}", rows.len(), has_more);
            effects.push(Effect::Notify(ClientUpdate::ViewChanged));
        } else {
            debug!("Loaded {} rows, has_more={}", rows.len(), has_more);
            effects.push(Effect::Notify(ClientUpdate::HistoryReplaced));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_wire::decode;

    fn coordinator() -> SessionCoordinator {
        SessionCoordinator::new(SessionSettings::default())
    }

    fn event(raw: &str) -> DomainEvent {
        decode(raw).unwrap()
    }

    fn sent(effects: &[Effect]) -> Vec<&ClientCommand> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    fn stream_text(session: &str, text: &str, pane: Option<&str>) -> String {
        let pane = pane
            .map(|p| format!(r#","pane_type":"{p}""#))
            .unwrap_or_default();
        format!(
            r#"{{"type":"stream_message","session_id":"{session}"{pane},"message":{{"type":"assistant","message":{{"content":[{{"type":"text","text":"{text}"}}]}}}}}}"#
        )
    }

    fn page(session: &str, ids: &[(&str, &str)], has_more: bool) -> String {
        let rows: Vec<String> = ids
            .iter()
            .map(|(id, ts)| {
                format!(
                    r#"{{"id":"{id}","role":"assistant","content":"{id}","message_type":"text","created_at":"{ts}"}}"#
                )
            })
            .collect();
        format!(
            r#"{{"type":"session_messages","session_id":"{session}","has_more":{has_more},"messages":[{}]}}"#,
            rows.join(",")
        )
    }

    fn attached(id: &str) -> SessionCoordinator {
        let mut c = coordinator();
        c.attach(id.to_string());
        c
    }

    // ── start / attach ──────────────────────────────────────────────────

    #[test]
    fn test_start_waits_for_session_id() {
        let mut c = coordinator();
        let effects = c.start(Some("agent-1".into()));
        assert_eq!(
            sent(&effects),
            vec![&ClientCommand::StartSession {
                cli_client_id: Some("agent-1".into())
            }]
        );
        assert_eq!(c.phase(), &SessionPhase::NoSession);
        assert!(c.view().awaiting_start);

        c.handle_event(event(r#"{"type":"session_started","session_id":"S1"}"#));
        assert_eq!(c.phase(), &SessionPhase::Pending("S1".into()));
        assert!(!c.view().awaiting_start);
    }

    #[test]
    fn test_pending_connected_promotes_to_attached() {
        let mut c = coordinator();
        c.start(None);
        c.handle_event(event(r#"{"type":"session_started","session_id":"S1"}"#));
        c.handle_event(event(r#"{"type":"session_status","status":"connected"}"#));
        assert_eq!(c.phase(), &SessionPhase::Attached("S1".into()));
        assert_eq!(c.view().remote_status, Some(SessionStatus::Connected));
    }

    #[test]
    fn test_ended_demotes_to_history_only() {
        let mut c = attached("S1");
        c.handle_event(event(r#"{"type":"session_status","status":"ended"}"#));
        assert_eq!(c.phase(), &SessionPhase::HistoryOnly("S1".into()));
        assert!(!c.view().is_attached);
    }

    #[test]
    fn test_reattach_same_id_keeps_history() {
        let mut c = attached("S1");
        c.handle_event(event(&stream_text("S1", "hello", Some("deadloop"))));
        assert_eq!(c.history().len(), 1);

        let effects = c.attach("S1".into());
        assert_eq!(
            sent(&effects),
            vec![&ClientCommand::AttachSession {
                session_id: "S1".into()
            }]
        );
        assert_eq!(c.history().len(), 1);
        assert!(c.view().is_dual_pane);
    }

    #[test]
    fn test_attach_other_id_clears_history() {
        let mut c = attached("S1");
        c.handle_event(event(&stream_text("S1", "hello", Some("deadloop"))));
        c.attach("S2".into());
        assert!(c.history().is_empty());
        assert!(!c.view().is_dual_pane);
        assert_eq!(c.view().current_session_id.as_deref(), Some("S2"));
    }

    #[test]
    fn test_view_history_only_fetches_page() {
        let mut c = attached("S1");
        c.handle_event(event(&stream_text("S1", "hello", None)));
        let effects = c.view_history_only("S1".into());
        assert!(c.history().is_empty());
        assert!(!c.view().is_attached);
        assert_eq!(
            sent(&effects),
            vec![&ClientCommand::GetSessionMessages {
                session_id: "S1".into(),
                limit: Some(50),
                before_id: None
            }]
        );
    }

    // ── isolation ───────────────────────────────────────────────────────

    #[test]
    fn test_foreign_session_events_are_discarded() {
        let mut c = attached("S1");
        let effects = c.handle_event(event(&stream_text("S2", "leak", Some("deadloop"))));
        assert!(effects.is_empty());
        assert!(c.history().is_empty());
        assert!(!c.view().is_dual_pane);

        c.handle_event(event(r#"{"type":"user_input","session_id":"S2","text":"x"}"#));
        c.handle_event(event(&page("S2", &[("m1", "2024-01-01T00:00:00Z")], false)));
        assert!(c.history().is_empty());
    }

    #[test]
    fn test_output_requires_attachment() {
        let mut c = coordinator();
        c.handle_event(event(r#"{"type":"output","content":"orphan"}"#));
        assert!(c.history().is_empty());

        let mut c = attached("S1");
        c.handle_event(event(r#"{"type":"output","content":"hi","output_type":{"code":{"language":"rust"}}}"#));
        let entry = &c.history().entries(Pane::Main)[0];
        assert_eq!(entry.kind, EntryKind::Code { language: Some("rust".into()) });
    }

    // ── history pages ───────────────────────────────────────────────────

    #[test]
    fn test_pagination_prepends_union() {
        let mut c = attached("S1");
        c.handle_event(event(&page(
            "S1",
            &[("m3", "2024-01-01T00:00:03Z"), ("m4", "2024-01-01T00:00:04Z")],
            true,
        )));
        let effects = c.load_more().unwrap();
        assert_eq!(
            sent(&effects),
            vec![&ClientCommand::GetSessionMessages {
                session_id: "S1".into(),
                limit: Some(50),
                before_id: Some("m3".into())
            }]
        );
        assert_eq!(c.load_more(), Err(CommandRejected::AlreadyLoading));

        let effects = c.handle_event(event(&page(
            "S1",
            &[
                ("m1", "2024-01-01T00:00:01Z"),
                ("m2", "2024-01-01T00:00:02Z"),
                ("m3", "2024-01-01T00:00:03Z"),
            ],
            false,
        )));
        assert!(effects.contains(&Effect::Notify(ClientUpdate::HistoryPrepended {
            pane: Pane::Main,
            inserted: 2
        })));
        let ids: Vec<&str> = c
            .history()
            .entries(Pane::Main)
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3", "m4"]);
        assert!(!c.view().has_more_history);
        assert_eq!(c.load_more(), Err(CommandRejected::NoMoreHistory));
    }

    #[test]
    fn test_non_continuation_page_replaces() {
        let mut c = attached("S1");
        c.handle_event(event(&stream_text("S1", "live", None)));
        c.handle_event(event(&page("S1", &[("m1", "2024-01-01T00:00:01Z")], false)));
        assert_eq!(c.history().len(), 1);
        assert!(c.history().contains("m1"));
    }

    #[test]
    fn test_load_more_without_session() {
        let mut c = coordinator();
        assert_eq!(c.load_more(), Err(CommandRejected::NoSession));
    }

    #[test]
    fn test_dual_pane_page_splits() {
        let mut c = attached("S1");
        c.handle_event(event(
            r#"{"type":"session_messages","session_id":"S1","has_more":false,"messages":[
                {"id":"a","role":"user","content":"go","message_type":"text","pane_type":"interactive","created_at":"2024-01-01T00:00:01Z"},
                {"id":"b","role":"assistant","content":"working","message_type":"text","pane_type":"deadloop","created_at":"2024-01-01T00:00:02Z"}
            ]}"#,
        ));
        assert!(c.view().is_dual_pane);
        assert_eq!(c.history().entries(Pane::Interactive)[0].id, "a");
        assert_eq!(c.history().entries(Pane::Deadloop)[0].id, "b");
    }

    // ── input ───────────────────────────────────────────────────────────

    #[test]
    fn test_input_requires_active_session() {
        let mut c = coordinator();
        assert_eq!(
            c.send_input("hi".into(), None),
            Err(CommandRejected::NoSession)
        );
        c.view_history_only("S1".into());
        assert_eq!(
            c.send_input("hi".into(), None),
            Err(CommandRejected::SessionNotActive)
        );
        assert_eq!(c.interrupt(), Err(CommandRejected::SessionNotActive));
        let mut c = attached("S1");
        assert_eq!(c.send_input("   ".into(), None), Err(CommandRejected::EmptyInput));
    }

    #[test]
    fn test_optimistic_input_confirmed_by_echo() {
        let mut c = attached("S1");
        let effects = c.send_input("run tests".into(), None).unwrap();
        assert_eq!(
            sent(&effects),
            vec![&ClientCommand::Input {
                text: "run tests".into(),
                pane_type: None
            }]
        );
        let local_id = c.history().entries(Pane::Main)[0].id.clone();

        let effects = c.handle_event(event(
            r#"{"type":"user_input","session_id":"S1","text":"run tests"}"#,
        ));
        assert_eq!(
            effects,
            vec![Effect::Notify(ClientUpdate::EntryConfirmed { id: local_id })]
        );
        assert_eq!(c.history().len(), 1);

        // A second identical echo is someone else's input.
        c.handle_event(event(r#"{"type":"user_input","session_id":"S1","text":"run tests"}"#));
        assert_eq!(c.history().len(), 2);
    }

    #[test]
    fn test_interrupt_sends_sigint() {
        let mut c = attached("S1");
        assert_eq!(
            sent(&c.interrupt().unwrap()),
            vec![&ClientCommand::Signal {
                signal: "SIGINT".into()
            }]
        );
    }

    // ── errors / status ─────────────────────────────────────────────────

    #[test]
    fn test_server_error_becomes_system_entry() {
        let mut c = attached("S1");
        let effects = c.handle_event(event(r#"{"type":"error","message":"CLI not connected"}"#));
        let entry = &c.history().entries(Pane::Main)[0];
        assert_eq!(entry.role, Role::System);
        assert_eq!(entry.kind, EntryKind::Error);
        assert!(effects.contains(&Effect::Notify(ClientUpdate::ServerError {
            message: "CLI not connected".into()
        })));
    }

    #[test]
    fn test_error_ends_pending_load() {
        let mut c = attached("S1");
        c.handle_event(event(&page("S1", &[("m1", "2024-01-01T00:00:01Z")], true)));
        c.load_more().unwrap();
        c.handle_event(event(r#"{"type":"error","message":"Failed to load messages"}"#));
        assert!(!c.view().is_loading_more);
    }

    #[test]
    fn test_deadloop_status() {
        let mut c = attached("S1");
        c.handle_event(event(r#"{"type":"deadloop_status","is_paused":true}"#));
        assert_eq!(c.view().deadloop_paused, Some(true));
    }

    // ── polling / promotion ─────────────────────────────────────────────

    #[test]
    fn test_live_agent_promotes_history_view() {
        let mut c = coordinator();
        c.view_history_only("S1".into());
        c.handle_event(event(&page("S1", &[("m1", "2024-01-01T00:00:01Z")], false)));

        let effects = c.handle_event(event(
            r#"{"type":"cli_clients","clients":[{"id":"c1","status":"online","active_session":"S1"}]}"#,
        ));
        assert!(sent(&effects).contains(&&ClientCommand::AttachSession {
            session_id: "S1".into()
        }));
        assert_eq!(c.phase(), &SessionPhase::Attached("S1".into()));
        assert!(c.history().contains("m1"));
    }

    #[test]
    fn test_poll_timer_refreshes_and_rearms() {
        let mut c = coordinator();
        let effects = c.bootstrap();
        let token = effects
            .iter()
            .find_map(|e| match e {
                Effect::Schedule(t, d) if t.kind == TimerKind::Poll => {
                    assert_eq!(*d, Duration::from_secs(3));
                    Some(*t)
                }
                _ => None,
            })
            .unwrap();
        let effects = c.on_timer(token);
        assert_eq!(
            sent(&effects),
            vec![&ClientCommand::ListCliClients, &ClientCommand::ListSessions]
        );
        // The old token is no longer armed.
        assert!(c.on_timer(token).is_empty());
    }

    #[test]
    fn test_reconnect_reattaches_with_resync() {
        let mut c = attached("S1");
        c.handle_event(event(&stream_text("S1", "before drop", None)));
        c.on_connection_lost();
        let effects = c.bootstrap();
        assert!(sent(&effects).contains(&&ClientCommand::AttachSession {
            session_id: "S1".into()
        }));
        assert!(c.view().is_resyncing);
        assert_eq!(c.history().len(), 1);

        c.handle_event(event(r#"{"type":"session_started","session_id":"S1"}"#));
        assert!(!c.view().is_resyncing);
    }

    #[test]
    fn test_resync_safety_timer_clears_flag() {
        let mut c = attached("S1");
        let effects = c.on_foreground();
        let token = effects
            .iter()
            .find_map(|e| match e {
                Effect::Schedule(t, _) if t.kind == TimerKind::ResyncSafety => Some(*t),
                _ => None,
            })
            .unwrap();
        assert!(c.view().is_resyncing);
        c.on_timer(token);
        assert!(!c.view().is_resyncing);
    }

    #[test]
    fn test_reset_cancels_timers() {
        let mut c = attached("S1");
        c.bootstrap();
        let effects = c.reset();
        assert!(effects.iter().any(|e| matches!(e, Effect::Cancel(t) if t.kind == TimerKind::Poll)));
        assert_eq!(c.phase(), &SessionPhase::NoSession);
    }
}
