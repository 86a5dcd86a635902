use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("Invalid message role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// The two named panes a dual-pane session exposes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaneId {
    Deadloop,
    Interactive,
}

impl PaneId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaneId::Deadloop => "deadloop",
            PaneId::Interactive => "interactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deadloop" => Some(PaneId::Deadloop),
            "interactive" => Some(PaneId::Interactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `pane_type` value as it arrived on the wire.
///
/// Unrecognized tags are kept: their mere presence still switches the client
/// into dual-pane mode, but the entry lands in the main pane.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaneTag {
    Known(PaneId),
    Other(String),
}

impl PaneTag {
    pub fn from_wire(tag: &str) -> Self {
        match PaneId::parse(tag) {
            Some(pane) => PaneTag::Known(pane),
            None => PaneTag::Other(tag.to_string()),
        }
    }

    pub fn pane(&self) -> Option<PaneId> {
        match self {
            PaneTag::Known(pane) => Some(*pane),
            PaneTag::Other(_) => None,
        }
    }
}

/// What a conversation entry represents. Absence of a kind means `Text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    #[default]
    Text,
    Code {
        language: Option<String>,
    },
    ToolInvocation {
        tool: String,
        input: Value,
    },
    ToolOutcome {
        tool: String,
        success: bool,
    },
    ApprovalRequest {
        request_id: String,
        tool: String,
        description: String,
    },
    SystemNotice,
    Error,
}

impl EntryKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Text => "text",
            EntryKind::Code { .. } => "code",
            EntryKind::ToolInvocation { .. } => "tool_invocation",
            EntryKind::ToolOutcome { .. } => "tool_outcome",
            EntryKind::ApprovalRequest { .. } => "approval_request",
            EntryKind::SystemNotice => "system_notice",
            EntryKind::Error => "error",
        }
    }
}

/// One message unit of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane: Option<PaneId>,
}

impl ConversationEntry {
    pub fn new(
        id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            created_at,
            kind: EntryKind::Text,
            pane: None,
        }
    }

    /// A fresh entry with a locally generated id.
    pub fn local(role: Role, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), role, content, created_at)
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }
}

/// An entry plus the wire pane tag it arrived with, before routing.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEntry {
    pub entry: ConversationEntry,
    pub tag: Option<PaneTag>,
}

impl TaggedEntry {
    pub fn new(entry: ConversationEntry, tag: Option<PaneTag>) -> Self {
        Self { entry, tag }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
    #[serde(other)]
    Unknown,
}

/// A remote agent process (a "CLI client") as reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteAgent {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: AgentStatus,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, alias = "active_session_id")]
    pub active_session: Option<String>,
}

impl RemoteAgent {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// The session this agent is driving right now, if it is reachable.
    pub fn live_session(&self) -> Option<&str> {
        if self.status == AgentStatus::Offline {
            return None;
        }
        self.active_session.as_deref()
    }
}

/// A persisted session as reported by the `sessions` listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub cli_client_id: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub owner_email: Option<String>,
}

impl SessionRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }
}

/// Lifecycle status of the remote session, as pushed by `session_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionStatus {
    Pending,
    Connected,
    Disconnected,
    Ended,
    Other(String),
}

impl From<String> for SessionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => SessionStatus::Pending,
            "connected" => SessionStatus::Connected,
            "disconnected" => SessionStatus::Disconnected,
            "ended" => SessionStatus::Ended,
            _ => SessionStatus::Other(s),
        }
    }
}

impl From<SessionStatus> for String {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Pending => "pending".to_string(),
            SessionStatus::Connected => "connected".to_string(),
            SessionStatus::Disconnected => "disconnected".to_string(),
            SessionStatus::Ended => "ended".to_string(),
            SessionStatus::Other(s) => s,
        }
    }
}

/// Parse a server timestamp: RFC 3339, or SQLite's `YYYY-MM-DD HH:MM:SS[.fff]` (UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_role_from_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("robot".parse::<Role>().is_err());
    }

    #[test]
    fn test_pane_tag_from_wire() {
        assert_eq!(
            PaneTag::from_wire("deadloop"),
            PaneTag::Known(PaneId::Deadloop)
        );
        assert_eq!(
            PaneTag::from_wire("interactive").pane(),
            Some(PaneId::Interactive)
        );
        let other = PaneTag::from_wire("sidebar");
        assert_eq!(other, PaneTag::Other("sidebar".into()));
        assert_eq!(other.pane(), None);
    }

    #[test]
    fn test_entry_kind_defaults_to_text() {
        let entry: ConversationEntry = serde_json::from_str(
            r#"{"id":"m1","role":"user","content":"hi","created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(entry.kind, EntryKind::Text);
        assert_eq!(entry.pane, None);
    }

    #[test]
    fn test_local_entries_get_distinct_ids() {
        let now = Utc::now();
        let a = ConversationEntry::local(Role::User, "a", now);
        let b = ConversationEntry::local(Role::User, "a", now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_session_status_roundtrip_preserves_unknown() {
        let s: SessionStatus = serde_json::from_str(r#""connected""#).unwrap();
        assert_eq!(s, SessionStatus::Connected);
        let s: SessionStatus = serde_json::from_str(r#""paused""#).unwrap();
        assert_eq!(s, SessionStatus::Other("paused".into()));
        assert_eq!(serde_json::to_string(&s).unwrap(), r#""paused""#);
    }

    #[test]
    fn test_remote_agent_accepts_both_active_session_spellings() {
        let a: RemoteAgent = serde_json::from_str(
            r#"{"id":"c1","status":"online","active_session":"s1"}"#,
        )
        .unwrap();
        assert_eq!(a.active_session.as_deref(), Some("s1"));
        let b: RemoteAgent = serde_json::from_str(
            r#"{"id":"c2","name":"laptop","status":"busy","active_session_id":"s2"}"#,
        )
        .unwrap();
        assert_eq!(b.active_session.as_deref(), Some("s2"));
        assert_eq!(b.display_name(), "laptop");
    }

    #[test]
    fn test_offline_agent_has_no_live_session() {
        let a: RemoteAgent = serde_json::from_str(
            r#"{"id":"c1","status":"offline","active_session":"s1"}"#,
        )
        .unwrap();
        assert_eq!(a.live_session(), None);
    }

    #[test]
    fn test_unknown_agent_status() {
        let a: RemoteAgent =
            serde_json::from_str(r#"{"id":"c1","status":"hibernating"}"#).unwrap();
        assert_eq!(a.status, AgentStatus::Unknown);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_session_record_minimal() {
        let r: SessionRecord =
            serde_json::from_str(r#"{"id":"s1","status":"active"}"#).unwrap();
        assert!(!r.is_shared);
        assert!(r.created_at().is_none());
    }
}
