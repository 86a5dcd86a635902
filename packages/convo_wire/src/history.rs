//! Persisted history rows (`session_messages`) → conversation entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::{ConversationEntry, EntryKind, PaneTag, Role, TaggedEntry, parse_timestamp};

/// One row of a `session_messages` page, exactly as the server stores it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRow {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub pane_type: Option<String>,
}

fn default_message_type() -> String {
    "text".to_string()
}

/// Convert a page of rows, oldest first, into tagged entries.
///
/// Rows with a missing or unparseable `created_at` inherit the previous row's
/// timestamp; leading rows without one take the first parseable timestamp of
/// the page, or `now` if there is none.
pub fn rows_to_entries(rows: &[HistoryRow], now: DateTime<Utc>) -> Vec<TaggedEntry> {
    let mut previous = rows
        .iter()
        .find_map(|r| r.created_at.as_deref().and_then(parse_timestamp))
        .unwrap_or(now);

    rows.iter()
        .map(|row| {
            let created_at = row
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(previous);
            previous = created_at;
            TaggedEntry::new(
                row_to_entry(row, created_at),
                row.pane_type.as_deref().map(PaneTag::from_wire),
            )
        })
        .collect()
}

fn row_to_entry(row: &HistoryRow, created_at: DateTime<Utc>) -> ConversationEntry {
    let role = row.role.parse::<Role>().unwrap_or_else(|_| {
        debug!("History row {} has unknown role {:?}", row.id, row.role);
        Role::System
    });
    ConversationEntry::new(row.id.clone(), role, row.content.clone(), created_at)
        .with_kind(kind_for(&row.message_type, &row.content))
}

/// Map a stored `message_type` onto an entry kind.
///
/// Structured kinds keep their payload as a JSON string in `content`; when it
/// cannot be recovered the row degrades to `Text` so nothing is lost.
pub fn kind_for(message_type: &str, content: &str) -> EntryKind {
    let kind = match message_type {
        "text" => Some(EntryKind::Text),
        "code" => Some(EntryKind::Code {
            language: fence_language(content),
        }),
        "tool_use" => nested(content).and_then(|v| {
            Some(EntryKind::ToolInvocation {
                tool: str_field(&v, &["tool", "name"])?,
                input: v.get("input").cloned().unwrap_or(Value::Null),
            })
        }),
        "tool_result" => nested(content).and_then(|v| {
            let success = match v.get("success").and_then(Value::as_bool) {
                Some(success) => success,
                None => !v.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            };
            Some(EntryKind::ToolOutcome {
                tool: str_field(&v, &["tool", "name"])?,
                success,
            })
        }),
        "approval_request" => nested(content).and_then(|v| {
            Some(EntryKind::ApprovalRequest {
                request_id: str_field(&v, &["request_id", "tool_call_id"])?,
                tool: str_field(&v, &["tool"])?,
                description: str_field(&v, &["description"]).unwrap_or_default(),
            })
        }),
        "system" | "result" => Some(EntryKind::SystemNotice),
        "error" => Some(EntryKind::Error),
        _ => Some(EntryKind::Text),
    };

    kind.unwrap_or_else(|| {
        debug!("Could not recover {} payload, keeping as text", message_type);
        EntryKind::Text
    })
}

fn nested(content: &str) -> Option<Value> {
    serde_json::from_str::<Value>(content)
        .ok()
        .filter(Value::is_object)
}

fn str_field(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn fence_language(content: &str) -> Option<String> {
    let rest = content.trim_start().strip_prefix("```")?;
    let lang = rest.lines().next()?.trim();
    (!lang.is_empty()).then(|| lang.to_string())
}
