//! Translation of the agent's stream-json records into conversation entries.
//!
//! A `stream_message` event wraps one record of the agent's
//! `--output-format stream-json` output:
//!
//! - `assistant` records carry content blocks: text and tool invocations
//! - `user` records carry tool results (and occasionally text)
//! - `result` records close a turn with cost and duration
//! - `system` records describe the agent's environment and produce no entry
//!
//! Tool results only reference the invocation by id, so the translator
//! remembers `tool_use_id → tool name` across records.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{ConversationEntry, EntryKind, Role};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        model: String,
        #[serde(default)]
        cwd: Option<String>,
    },
    Assistant {
        message: StreamMessageBody,
    },
    User {
        message: StreamMessageBody,
    },
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        result: String,
        #[serde(default)]
        total_cost_usd: f64,
        #[serde(default)]
        duration_ms: u64,
        #[serde(default)]
        is_error: bool,
    },
    /// A record this client does not understand, kept verbatim.
    #[serde(skip)]
    Unrecognized(Value),
}

impl StreamRecord {
    /// Interpret a raw record. Never fails: anything unparseable is `Unrecognized`.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<StreamRecord>(value.clone()) {
            Ok(record) => record,
            Err(e) => {
                debug!("Unrecognized stream record: {}", e);
                StreamRecord::Unrecognized(value)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessageBody {
    pub content: MessageContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    /// Catch-all for unknown content types
    #[serde(other)]
    Unknown,
}

/// Stateful record → entries translator, one per tracked session.
#[derive(Debug, Default)]
pub struct StreamTranslator {
    tool_names: HashMap<String, String>,
}

impl StreamTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget remembered tool names (session switch).
    pub fn reset(&mut self) {
        self.tool_names.clear();
    }

    pub fn translate(&mut self, record: StreamRecord, at: DateTime<Utc>) -> Vec<ConversationEntry> {
        match record {
            StreamRecord::System {
                subtype,
                model,
                cwd,
            } => {
                debug!(
                    "Agent system record: subtype={} model={} cwd={:?}",
                    subtype, model, cwd
                );
                Vec::new()
            }
            StreamRecord::Assistant { message } => self.blocks(Role::Assistant, message.content, at),
            StreamRecord::User { message } => self.blocks(Role::User, message.content, at),
            StreamRecord::Result {
                subtype,
                total_cost_usd,
                duration_ms,
                ..
            } => {
                let summary = format!(
                    "{} - Cost: ${:.4}, Duration: {}ms",
                    subtype, total_cost_usd, duration_ms
                );
                vec![ConversationEntry::local(Role::System, summary, at).with_kind(EntryKind::SystemNotice)]
            }
            StreamRecord::Unrecognized(raw) => {
                vec![ConversationEntry::local(Role::System, raw.to_string(), at)]
            }
        }
    }

    fn blocks(&mut self, role: Role, content: MessageContent, at: DateTime<Utc>) -> Vec<ConversationEntry> {
        let blocks = match content {
            MessageContent::Text(text) => return vec![ConversationEntry::local(role, text, at)],
            MessageContent::Blocks(blocks) => blocks,
        };

        let mut entries = Vec::with_capacity(blocks.len());
        for block in blocks {
            match block {
                ContentBlock::Text { text } => {
                    entries.push(ConversationEntry::local(role, text, at));
                }
                ContentBlock::ToolUse { id, name, input } => {
                    self.tool_names.insert(id, name.clone());
                    let content = input.to_string();
                    entries.push(
                        ConversationEntry::local(Role::Assistant, content, at)
                            .with_kind(EntryKind::ToolInvocation { tool: name, input }),
                    );
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    // A tool use gets exactly one result; forget it once resolved.
                    let tool = self.tool_names.remove(&tool_use_id).unwrap_or(tool_use_id);
                    entries.push(
                        ConversationEntry::local(role, tool_result_text(&content), at).with_kind(
                            EntryKind::ToolOutcome {
                                tool,
                                success: !is_error,
                            },
                        ),
                    );
                }
                ContentBlock::Thinking { .. } | ContentBlock::Unknown => {}
            }
        }
        entries
    }
}

/// Tool result content is either a string or a list of text blocks.
fn tool_result_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
