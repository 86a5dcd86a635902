//! Wire Protocol Types
//!
//! JSON messages exchanged with the server over the persistent connection.
//! Every message is an object discriminated by its `type` field.
//!
//! Outbound messages are [`ClientCommand`]s. Inbound messages are decoded in
//! two steps: serde parses the raw catalogue, then one exhaustive mapping
//! turns it into a [`DomainEvent`] with typed payloads. Event types this
//! client does not know decode to [`DomainEvent::Unknown`] instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;
use crate::history::HistoryRow;
use crate::stream::StreamRecord;
use crate::types::{EntryKind, PaneId, PaneTag, RemoteAgent, Role, SessionRecord, SessionStatus};

/// Commands sent from this client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Authenticate {
        token: String,
    },
    StartSession {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cli_client_id: Option<String>,
    },
    AttachSession {
        session_id: String,
    },
    ListCliClients,
    ListSessions,
    GetSessionMessages {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before_id: Option<String>,
    },
    Input {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pane_type: Option<PaneId>,
    },
    Approve {
        tool_call_id: String,
    },
    Reject {
        tool_call_id: String,
    },
    /// Deliver a signal (e.g. `SIGINT`) to the remote agent.
    Signal {
        signal: String,
    },
    PauseDeadloop,
    ResumeDeadloop,
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::StartSession { .. } => "start_session",
            Self::AttachSession { .. } => "attach_session",
            Self::ListCliClients => "list_cli_clients",
            Self::ListSessions => "list_sessions",
            Self::GetSessionMessages { .. } => "get_session_messages",
            Self::Input { .. } => "input",
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Signal { .. } => "signal",
            Self::PauseDeadloop => "pause_deadloop",
            Self::ResumeDeadloop => "resume_deadloop",
        }
    }
}

/// Raw inbound catalogue, exactly as serialized by the server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerEvent {
    Authenticated {
        user_id: String,
    },
    AuthenticationFailed {
        #[serde(default)]
        reason: String,
    },
    CliClients {
        #[serde(default)]
        clients: Vec<RemoteAgent>,
    },
    Sessions {
        #[serde(default)]
        sessions: Vec<SessionRecord>,
    },
    SessionStarted {
        session_id: String,
    },
    SessionStatus {
        status: SessionStatus,
    },
    Output {
        content: String,
        #[serde(default)]
        output_type: Value,
        #[serde(default)]
        pane_type: Option<String>,
    },
    StreamMessage {
        session_id: String,
        message: Value,
        #[serde(default)]
        pane_type: Option<String>,
    },
    UserInput {
        session_id: String,
        text: String,
        #[serde(default)]
        pane_type: Option<String>,
    },
    SessionMessages {
        session_id: String,
        #[serde(default)]
        messages: Vec<HistoryRow>,
        #[serde(default)]
        has_more: bool,
    },
    DeadloopStatus {
        is_paused: bool,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Typed inbound event.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    Authenticated {
        user_id: String,
    },
    AuthenticationFailed {
        reason: String,
    },
    CliClients {
        clients: Vec<RemoteAgent>,
    },
    Sessions {
        sessions: Vec<SessionRecord>,
    },
    SessionStarted {
        session_id: String,
    },
    SessionStatus {
        status: SessionStatus,
    },
    /// Output for the tracked session; carries no session id of its own.
    Output {
        content: String,
        role: Role,
        kind: EntryKind,
        tag: Option<PaneTag>,
    },
    StreamMessage {
        session_id: String,
        record: StreamRecord,
        tag: Option<PaneTag>,
    },
    UserInput {
        session_id: String,
        text: String,
        tag: Option<PaneTag>,
    },
    SessionMessages {
        session_id: String,
        rows: Vec<HistoryRow>,
        has_more: bool,
    },
    DeadloopStatus {
        is_paused: bool,
    },
    Error {
        message: String,
    },
    Unknown {
        event_type: String,
        raw: Value,
    },
}

impl DomainEvent {
    /// Session id for events scoped to one session: live pushes
    /// (`stream_message`, `user_input`), history pages and `session_started`.
    /// `output` carries none and applies to the tracked session.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::StreamMessage { session_id, .. }
            | Self::UserInput { session_id, .. }
            | Self::SessionMessages { session_id, .. }
            | Self::SessionStarted { session_id } => Some(session_id),
            _ => None,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::CliClients { .. } => "cli_clients",
            Self::Sessions { .. } => "sessions",
            Self::SessionStarted { .. } => "session_started",
            Self::SessionStatus { .. } => "session_status",
            Self::Output { .. } => "output",
            Self::StreamMessage { .. } => "stream_message",
            Self::UserInput { .. } => "user_input",
            Self::SessionMessages { .. } => "session_messages",
            Self::DeadloopStatus { .. } => "deadloop_status",
            Self::Error { .. } => "error",
            Self::Unknown { event_type, .. } => event_type,
        }
    }
}

/// Decode one inbound text frame.
pub fn decode(raw: &str) -> Result<DomainEvent, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    let event = serde_json::from_value::<ServerEvent>(value.clone()).map_err(|source| {
        DecodeError::Invalid {
            event_type: event_type.clone(),
            source,
        }
    })?;

    Ok(match event {
        ServerEvent::Authenticated { user_id } => DomainEvent::Authenticated { user_id },
        ServerEvent::AuthenticationFailed { reason } => {
            DomainEvent::AuthenticationFailed { reason }
        }
        ServerEvent::CliClients { clients } => DomainEvent::CliClients { clients },
        ServerEvent::Sessions { sessions } => DomainEvent::Sessions { sessions },
        ServerEvent::SessionStarted { session_id } => DomainEvent::SessionStarted { session_id },
        ServerEvent::SessionStatus { status } => DomainEvent::SessionStatus { status },
        ServerEvent::Output {
            content,
            output_type,
            pane_type,
        } => {
            let kind = output_kind(&output_type);
            let role = match kind {
                EntryKind::SystemNotice | EntryKind::Error => Role::System,
                _ => Role::Assistant,
            };
            DomainEvent::Output {
                content,
                role,
                kind,
                tag: pane_type.as_deref().map(PaneTag::from_wire),
            }
        }
        ServerEvent::StreamMessage {
            session_id,
            message,
            pane_type,
        } => DomainEvent::StreamMessage {
            session_id,
            record: StreamRecord::from_value(message),
            tag: pane_type.as_deref().map(PaneTag::from_wire),
        },
        ServerEvent::UserInput {
            session_id,
            text,
            pane_type,
        } => DomainEvent::UserInput {
            session_id,
            text,
            tag: pane_type.as_deref().map(PaneTag::from_wire),
        },
        ServerEvent::SessionMessages {
            session_id,
            messages,
            has_more,
        } => DomainEvent::SessionMessages {
            session_id,
            rows: messages,
            has_more,
        },
        ServerEvent::DeadloopStatus { is_paused } => DomainEvent::DeadloopStatus { is_paused },
        ServerEvent::Error { message } => DomainEvent::Error { message },
        ServerEvent::Unknown => DomainEvent::Unknown {
            event_type,
            raw: value,
        },
    })
}

/// Encode one outbound command as a text frame.
pub fn encode(command: &ClientCommand) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}

/// Map the wire `output_type` onto an entry kind.
///
/// The server sends unit variants as bare strings (`"text"`) and data
/// variants as single-key objects (`{"code": {"language": "rust"}}`).
/// Anything unrecognized or incomplete degrades to `Text`.
fn output_kind(output_type: &Value) -> EntryKind {
    match output_type {
        Value::String(tag) => match tag.as_str() {
            "system" => EntryKind::SystemNotice,
            "error" => EntryKind::Error,
            "code" => EntryKind::Code { language: None },
            _ => EntryKind::Text,
        },
        Value::Object(map) if map.len() == 1 => {
            let Some((tag, body)) = map.iter().next() else {
                return EntryKind::Text;
            };
            let field = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
            let kind = match tag.as_str() {
                "code" => Some(EntryKind::Code {
                    language: field("language"),
                }),
                "tool_use" => field("tool").map(|tool| EntryKind::ToolInvocation {
                    tool,
                    input: body.get("input").cloned().unwrap_or(Value::Null),
                }),
                "tool_result" => field("tool").map(|tool| EntryKind::ToolOutcome {
                    tool,
                    success: body.get("success").and_then(Value::as_bool).unwrap_or(true),
                }),
                "approval_request" => {
                    match (field("tool_call_id").or_else(|| field("request_id")), field("tool")) {
                        (Some(request_id), Some(tool)) => Some(EntryKind::ApprovalRequest {
                            request_id,
                            tool,
                            description: field("description").unwrap_or_default(),
                        }),
                        _ => None,
                    }
                }
                _ => None,
            };
            kind.unwrap_or(EntryKind::Text)
        }
        _ => EntryKind::Text,
    }
}
