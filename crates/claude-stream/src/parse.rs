//! Conversion of decoded stream-json records into typed [`Message`]s.
//!
//! Parsing never fails. Unknown `type` values produce no message, and a field
//! that is missing or has the wrong JSON shape falls back to its default.
//! All field access goes through [`field`].

use serde_json::{Map, Value};

use crate::types::{
    AssistantMessage, ContentBlock, Message, ResultMessage, SystemMessage, UserMessage,
};

// ─── Field extraction ─────────────────────────────────────────────────────

/// A type that can be read out of a single JSON value, or `None` when the
/// value has a different shape.
pub trait FromField: Sized {
    fn from_field(value: &Value) -> Option<Self>;
}

impl FromField for String {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl FromField for bool {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromField for f64 {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

/// Integers may arrive as floats (`1500.0`) from producers that only know
/// one number type; finite, non-negative floats are truncated.
impl FromField for u64 {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f.trunc() as u64)
        })
    }
}

impl FromField for u32 {
    fn from_field(value: &Value) -> Option<Self> {
        u64::from_field(value).and_then(|n| u32::try_from(n).ok())
    }
}

impl FromField for Map<String, Value> {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_object().cloned()
    }
}

impl FromField for Value {
    fn from_field(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

/// Read `key` from `map` as `T`; absent or wrong-shaped fields are `None`.
pub fn field<T: FromField>(map: &Map<String, Value>, key: &str) -> Option<T> {
    map.get(key).and_then(T::from_field)
}

fn field_or_default<T: FromField + Default>(map: &Map<String, Value>, key: &str) -> T {
    field(map, key).unwrap_or_default()
}

// ─── Message dispatch ─────────────────────────────────────────────────────

/// Turn one decoded record into a [`Message`], or `None` for record types
/// this crate does not model (e.g. `stream_event`, `rate_limit_event`).
pub fn parse_message(record: &Map<String, Value>) -> Option<Message> {
    let kind: String = field(record, "type")?;
    match kind.as_str() {
        "user" => Some(Message::User(parse_user(record))),
        "assistant" => Some(Message::Assistant(parse_assistant(record))),
        "system" => Some(Message::System(SystemMessage {
            subtype: field_or_default(record, "subtype"),
            data: record.clone(),
        })),
        "result" => Some(Message::Result(parse_result(record))),
        _ => None,
    }
}

fn parse_user(record: &Map<String, Value>) -> UserMessage {
    let Some(inner) = field::<Map<String, Value>>(record, "message") else {
        return UserMessage::default();
    };
    match inner.get("content") {
        Some(Value::String(text)) => UserMessage {
            content: text.clone(),
            blocks: Vec::new(),
        },
        Some(Value::Array(entries)) => {
            let blocks = parse_blocks(entries);
            let content = blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            UserMessage { content, blocks }
        }
        _ => UserMessage::default(),
    }
}

fn parse_assistant(record: &Map<String, Value>) -> AssistantMessage {
    let content = field::<Map<String, Value>>(record, "message")
        .and_then(|inner| match inner.get("content") {
            Some(Value::Array(entries)) => Some(parse_blocks(entries)),
            _ => None,
        })
        .unwrap_or_default();
    AssistantMessage { content }
}

fn parse_blocks(entries: &[Value]) -> Vec<ContentBlock> {
    entries.iter().filter_map(parse_content_block).collect()
}

fn parse_result(record: &Map<String, Value>) -> ResultMessage {
    ResultMessage {
        subtype: field_or_default(record, "subtype"),
        cost_usd: field_or_default(record, "cost_usd"),
        total_cost_usd: field(record, "total_cost_usd")
            .or_else(|| field(record, "total_cost"))
            .unwrap_or_default(),
        duration_ms: field_or_default(record, "duration_ms"),
        duration_api_ms: field_or_default(record, "duration_api_ms"),
        num_turns: field_or_default(record, "num_turns"),
        session_id: field_or_default(record, "session_id"),
        usage: field_or_default(record, "usage"),
        result: field_or_default(record, "result"),
        is_error: field_or_default(record, "is_error"),
    }
}

/// Parse one entry of a `message.content` array. Entries that are not
/// objects, or whose `type` is not `text`, `tool_use` or `tool_result`, are
/// skipped.
pub fn parse_content_block(entry: &Value) -> Option<ContentBlock> {
    let block = entry.as_object()?;
    let kind: String = field(block, "type")?;
    match kind.as_str() {
        "text" => Some(ContentBlock::Text {
            text: field(block, "text")?,
        }),
        "tool_use" => Some(ContentBlock::ToolUse {
            id: field_or_default(block, "id"),
            name: field_or_default(block, "name"),
            input: field_or_default(block, "input"),
        }),
        "tool_result" => Some(ContentBlock::ToolResult {
            tool_use_id: field_or_default(block, "tool_use_id"),
            content: field_or_default(block, "content"),
            is_error: field_or_default(block, "is_error"),
        }),
        _ => None,
    }
}
