//! `convo watch`: follow a session and drive it from stdin.
//!
//! Entries are printed as they arrive. Lines typed on stdin are sent as
//! input unless they start with `/`, which selects a command:
//!
//! ```text
//! /more                   load older history
//! /approve ID | /reject ID
//! /pause | /resume        deadloop control
//! /interrupt              interrupt the agent
//! /pane deadloop|interactive|main
//! /reconnect              retry now after giving up
//! /quit
//! ```

use anyhow::{Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use convo_link::{
    ClientConfig, ClientError, ClientHandle, ClientUpdate, ConvoPaths, Directory,
    FileCredentialStore, Pane, SessionPhase, UiCommand, spawn_client,
};
use convo_wire::{ConversationEntry, PaneId};

use super::render;

/// What to show once connected.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Attach { session_id: String },
    HistoryOnly { session_id: String },
    Start { agent: Option<String> },
    /// The first session a live agent is driving.
    FirstLive,
}

/// A parsed stdin line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Empty,
    Input(String),
    More,
    Approve(String),
    Reject(String),
    Pause,
    Resume,
    Interrupt,
    Pane(Option<PaneId>),
    Reconnect,
    Quit,
}

pub fn parse_line(line: &str) -> Result<Line, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Line::Empty);
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Ok(Line::Input(line.trim_end_matches(['\r', '\n']).to_string()));
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    match (name, arg) {
        ("more", None) => Ok(Line::More),
        ("approve", Some(id)) => Ok(Line::Approve(id.to_string())),
        ("reject", Some(id)) => Ok(Line::Reject(id.to_string())),
        ("approve" | "reject", None) => Err(format!("usage: /{name} ID")),
        ("pause", None) => Ok(Line::Pause),
        ("resume", None) => Ok(Line::Resume),
        ("interrupt", None) => Ok(Line::Interrupt),
        ("pane", Some("main")) => Ok(Line::Pane(None)),
        ("pane", Some(pane)) => PaneId::parse(pane)
            .map(|p| Line::Pane(Some(p)))
            .ok_or_else(|| format!("unknown pane: {pane}")),
        ("pane", None) => Err("usage: /pane deadloop|interactive|main".to_string()),
        ("reconnect", None) => Ok(Line::Reconnect),
        ("quit" | "exit", None) => Ok(Line::Quit),
        _ => Err(format!("unknown command: /{command}")),
    }
}

struct Watcher {
    handle: ClientHandle,
    input_pane: Option<PaneId>,
    dual_pane: bool,
    last_phase: Option<SessionPhase>,
}

pub async fn watch_command(paths: &ConvoPaths, config: ClientConfig, target: Target) -> Result<()> {
    let credentials = FileCredentialStore::new(paths.credentials_path());
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_client(config, credentials, cancel.clone());
    let mut updates = handle.subscribe();

    let result = async {
        super::connect_and_wait(&handle, &mut updates).await?;
        let first = initial_command(&handle, &mut updates, target).await?;
        handle.execute(first).await?;

        spawn_foreground_listener(handle.clone(), cancel.clone());

        let mut watcher = Watcher {
            handle: handle.clone(),
            input_pane: None,
            dual_pane: false,
            last_phase: None,
        };
        watcher.run(&mut updates).await
    }
    .await;

    handle.shutdown();
    let _ = task.await;
    result
}

async fn initial_command(
    handle: &ClientHandle,
    updates: &mut broadcast::Receiver<ClientUpdate>,
    target: Target,
) -> Result<UiCommand> {
    Ok(match target {
        Target::Attach { session_id } => UiCommand::Attach { session_id },
        Target::HistoryOnly { session_id } => UiCommand::ViewHistoryOnly { session_id },
        Target::Start { agent } => UiCommand::StartSession { agent_id: agent },
        Target::FirstLive => {
            let snapshot = super::wait_for_directory(handle, updates).await?;
            let mut directory = Directory::new();
            directory.replace_agents(snapshot.agents);
            directory.replace_sessions(snapshot.sessions);
            let Some(live) = directory.projects().into_iter().find(|p| p.is_live) else {
                bail!("no live session; pass a session id or use --start");
            };
            eprintln!("[convo: attaching to {}]", live.record.id);
            UiCommand::Attach {
                session_id: live.record.id.clone(),
            }
        }
    })
}

impl Watcher {
    async fn run(&mut self, updates: &mut broadcast::Receiver<ClientUpdate>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(update) => {
                        if !self.show(update).await? {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Display fell behind by {} updates, redrawing", n);
                        self.redraw().await?;
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if !self.handle_line(&line).await? {
                            return Ok(());
                        }
                    }
                    None => return Ok(()),
                },
                _ = tokio::signal::ctrl_c() => return Ok(()),
            }
        }
    }

    /// Print one update. Returns `false` when watching should stop.
    async fn show(&mut self, update: ClientUpdate) -> Result<bool> {
        match update {
            ClientUpdate::EntryAdded { pane, entry } => {
                println!("{}", render::entry_line(pane, &entry, self.dual_pane));
            }
            ClientUpdate::HistoryReplaced => self.redraw().await?,
            ClientUpdate::HistoryPrepended { pane, inserted } => {
                if inserted > 0 {
                    let snapshot = self.handle.snapshot().await?;
                    println!("── older ({}) ──", pane);
                    for (p, entries) in &snapshot.panes {
                        if *p == pane {
                            for entry in entries.iter().take(inserted) {
                                println!("{}", render::entry_line(pane, entry, self.dual_pane));
                            }
                        }
                    }
                    println!("────");
                }
            }
            ClientUpdate::DualPaneEntered => {
                self.dual_pane = true;
                eprintln!("[convo: dual-pane session]");
            }
            ClientUpdate::Phase(phase) => eprintln!("[convo: {}]", phase),
            ClientUpdate::ViewChanged => {
                let view = self.handle.snapshot().await?.view;
                if self.last_phase.as_ref() != Some(&view.phase) {
                    match &view.phase {
                        SessionPhase::NoSession if view.awaiting_start => {
                            eprintln!("[convo: waiting for new session]")
                        }
                        SessionPhase::NoSession => {}
                        SessionPhase::Pending(id) => eprintln!("[convo: session {} pending]", id),
                        SessionPhase::Attached(id) => eprintln!("[convo: attached to {}]", id),
                        SessionPhase::HistoryOnly(id) => {
                            eprintln!("[convo: viewing history of {}]", id)
                        }
                    }
                    self.last_phase = Some(view.phase);
                }
            }
            ClientUpdate::LoginRequired { reason } => {
                eprintln!("[convo: login required ({})]", reason);
                return Ok(false);
            }
            ClientUpdate::ReconnectGaveUp => {
                eprintln!("[convo: cannot reach server; /reconnect to retry]");
            }
            ClientUpdate::EntryConfirmed { id } => debug!("Input {} confirmed", id),
            ClientUpdate::ServerError { .. } | ClientUpdate::DirectoryChanged => {}
        }
        Ok(true)
    }

    /// Print every loaded entry, oldest first across panes.
    async fn redraw(&mut self) -> Result<()> {
        let snapshot = self.handle.snapshot().await?;
        self.dual_pane = snapshot.view.is_dual_pane;
        let mut all: Vec<(Pane, &ConversationEntry)> = snapshot
            .panes
            .iter()
            .flat_map(|(pane, entries)| entries.iter().map(move |e| (*pane, e)))
            .collect();
        all.sort_by_key(|(_, e)| e.created_at);
        for (pane, entry) in all {
            println!("{}", render::entry_line(pane, entry, self.dual_pane));
        }
        Ok(())
    }

    /// Returns `false` on `/quit`.
    async fn handle_line(&mut self, line: &str) -> Result<bool> {
        let command = match parse_line(line) {
            Ok(Line::Empty) => return Ok(true),
            Ok(Line::Quit) => return Ok(false),
            Ok(Line::Pane(pane)) => {
                self.input_pane = pane;
                eprintln!(
                    "[convo: input goes to {}]",
                    pane.map_or("main", |p| p.as_str())
                );
                return Ok(true);
            }
            Ok(Line::Reconnect) => {
                self.handle.foreground().await?;
                return Ok(true);
            }
            Ok(Line::Input(text)) => UiCommand::SendInput {
                text,
                pane: self.input_pane,
            },
            Ok(Line::More) => UiCommand::LoadMore,
            Ok(Line::Approve(id)) => UiCommand::Approve { tool_call_id: id },
            Ok(Line::Reject(id)) => UiCommand::Reject { tool_call_id: id },
            Ok(Line::Pause) => UiCommand::PauseDeadloop,
            Ok(Line::Resume) => UiCommand::ResumeDeadloop,
            Ok(Line::Interrupt) => UiCommand::Interrupt,
            Err(message) => {
                eprintln!("[convo: {}]", message);
                return Ok(true);
            }
        };

        match self.handle.execute(command).await {
            Ok(()) => Ok(true),
            Err(ClientError::Rejected(rejected)) => {
                eprintln!("[convo: {}]", rejected);
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Treat `SIGCONT` (resumed after being stopped) as returning to the
/// foreground.
#[cfg(unix)]
fn spawn_foreground_listener(handle: ClientHandle, cancel: CancellationToken) {
    use nix::sys::signal::Signal;
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigcont = match signal(SignalKind::from_raw(Signal::SIGCONT as i32)) {
        Ok(s) => s,
        Err(e) => {
            warn!("Cannot listen for SIGCONT: {}", e);
            return;
        }
    };
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = sigcont.recv() => {
                    if received.is_none() || handle.foreground().await.is_err() {
                        break;
                    }
                    debug!("SIGCONT, treating as foreground");
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_foreground_listener(_handle: ClientHandle, _cancel: CancellationToken) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_input() {
        assert_eq!(parse_line("fix the tests\n"), Ok(Line::Input("fix the tests".into())));
        assert_eq!(parse_line("   "), Ok(Line::Empty));
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse_line("/more"), Ok(Line::More));
        assert_eq!(parse_line("/approve tc-1"), Ok(Line::Approve("tc-1".into())));
        assert_eq!(parse_line("/reject tc-2"), Ok(Line::Reject("tc-2".into())));
        assert_eq!(parse_line("/interrupt"), Ok(Line::Interrupt));
        assert_eq!(parse_line("/quit"), Ok(Line::Quit));
    }

    #[test]
    fn test_pane_selection() {
        assert_eq!(parse_line("/pane deadloop"), Ok(Line::Pane(Some(PaneId::Deadloop))));
        assert_eq!(parse_line("/pane interactive"), Ok(Line::Pane(Some(PaneId::Interactive))));
        assert_eq!(parse_line("/pane main"), Ok(Line::Pane(None)));
        assert!(parse_line("/pane sideways").is_err());
    }

    #[test]
    fn test_bad_commands() {
        assert!(parse_line("/approve").is_err());
        assert!(parse_line("/dance").is_err());
    }
}
