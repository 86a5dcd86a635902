//! Plain-text rendering for the line-oriented CLI.

use convo_link::{Pane, ProjectView};
use convo_wire::{AgentStatus, ConversationEntry, EntryKind, RemoteAgent};

const PREVIEW_CHARS: usize = 200;

/// One printed line (or block) for an entry. The pane prefix is only shown
/// once the view has more than one pane.
pub fn entry_line(pane: Pane, entry: &ConversationEntry, dual_pane: bool) -> String {
    let time = entry.created_at.format("%H:%M:%S");
    let prefix = if dual_pane {
        format!("{} [{}] ", time, pane)
    } else {
        format!("{} ", time)
    };

    let body = match &entry.kind {
        EntryKind::Text => format!("{}: {}", entry.role, entry.content),
        EntryKind::Code { language } => format!(
            "{}: ```{}\n{}\n```",
            entry.role,
            language.as_deref().unwrap_or(""),
            entry.content.trim_matches('\n')
        ),
        EntryKind::ToolInvocation { tool, input } => {
            format!("→ {} {}", tool, truncate(&input.to_string()))
        }
        EntryKind::ToolOutcome { tool, success } => {
            let mark = if *success { "ok" } else { "failed" };
            format!("← {} {}: {}", tool, mark, truncate(&entry.content))
        }
        EntryKind::ApprovalRequest {
            request_id,
            tool,
            description,
        } => format!(
            "? {} wants approval: {} (/approve {} or /reject {})",
            tool, description, request_id, request_id
        ),
        EntryKind::SystemNotice => format!("-- {}", entry.content),
        EntryKind::Error => format!("!! {}", entry.content),
    };
    format!("{}{}", prefix, body)
}

pub fn project_line(project: &ProjectView<'_>) -> String {
    let live = if project.is_live { "●" } else { " " };
    let dir = project.record.working_dir.as_deref().unwrap_or("-");
    let host = project.record.hostname.as_deref().unwrap_or("-");
    let agent = project
        .agent
        .map(|a| format!(" ({})", a.display_name()))
        .unwrap_or_default();
    format!("{} {}  {}  {}{}", live, project.record.id, host, dir, agent)
}

pub fn agent_line(agent: &RemoteAgent) -> String {
    let status = match agent.status {
        AgentStatus::Online => "online",
        AgentStatus::Offline => "offline",
        AgentStatus::Busy => "busy",
        AgentStatus::Unknown => "unknown",
    };
    let session = agent.active_session.as_deref().unwrap_or("-");
    format!("{} {}  {}  {}", agent.id, agent.display_name(), status, session)
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", cut)
}
