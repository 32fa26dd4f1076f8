use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ─── Outer Message enum ───────────────────────────────────────────────────

/// Every message surfaced from `claude --output-format stream-json`.
/// Selected by the record's `"type"` field; see [`crate::parse`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    System(SystemMessage),
    Result(ResultMessage),
}

impl Message {
    /// Returns `Some(&ResultMessage)` if this is the terminal result message.
    pub fn as_result(&self) -> Option<&ResultMessage> {
        if let Message::Result(r) = self {
            Some(r)
        } else {
            None
        }
    }

    pub fn is_result(&self) -> bool {
        matches!(self, Message::Result(_))
    }
}

// ─── User messages ────────────────────────────────────────────────────────

/// `type = "user"`.
///
/// `content` is the plain text of the message. When the CLI echoes structured
/// content back (tool results), the parsed blocks are kept in `blocks` and
/// `content` holds the concatenation of their text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<ContentBlock>,
}

// ─── Assistant messages ───────────────────────────────────────────────────

/// `type = "assistant"` — content blocks in generation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
}

impl AssistantMessage {
    /// All text blocks joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Content blocks within an assistant (or structured user) message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Tool inputs are schema-polymorphic (varies per tool).
        input: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
    },
}

// ─── System messages ──────────────────────────────────────────────────────

/// `type = "system"` — further distinguished by `subtype`.
///
/// The payload schema changes between CLI versions, so the whole record is
/// kept as-is in `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemMessage {
    pub subtype: String,
    pub data: Map<String, Value>,
}

impl SystemMessage {
    /// Session id announced by the `init` subtype, if present.
    pub fn session_id(&self) -> Option<&str> {
        self.data.get("session_id").and_then(Value::as_str)
    }
}

// ─── Result messages ──────────────────────────────────────────────────────

/// `type = "result"` — the terminal summary of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultMessage {
    pub subtype: String,
    pub cost_usd: f64,
    pub total_cost_usd: f64,
    pub duration_ms: u64,
    pub duration_api_ms: u64,
    pub num_turns: u32,
    pub session_id: String,
    pub usage: Map<String, Value>,
    pub result: String,
    pub is_error: bool,
}

impl ResultMessage {
    pub fn is_success(&self) -> bool {
        !self.is_error && self.subtype == "success"
    }

    /// The final result text, `None` when the CLI sent none.
    pub fn result_text(&self) -> Option<&str> {
        if self.result.is_empty() {
            None
        } else {
            Some(&self.result)
        }
    }
}

// ─── QueryOptions ─────────────────────────────────────────────────────────

/// Options for one query against the Claude CLI.
///
/// Read-only to the pipeline. Deserializable so a whole option set can be
/// kept in a YAML file (see [`QueryOptions::load`]).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Tool names that are auto-approved without user prompting
    pub allowed_tools: Vec<String>,
    /// Tool names that are explicitly disallowed
    pub disallowed_tools: Vec<String>,
    /// Override system prompt
    pub system_prompt: Option<String>,
    /// Text to append to the default system prompt
    pub append_system_prompt: Option<String>,
    /// Claude model name (e.g. `"claude-sonnet-4-6"`)
    pub model: Option<String>,
    /// Permission mode for tool execution
    pub permission_mode: PermissionMode,
    /// MCP tool used to answer permission prompts
    pub permission_prompt_tool_name: Option<String>,
    /// Maximum number of agentic turns
    pub max_turns: Option<u32>,
    /// Continue the most recent conversation
    pub continue_conversation: bool,
    /// Session ID to resume
    pub resume: Option<String>,
    /// MCP servers to register for this session, keyed by name
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    /// Working directory for the subprocess (default: current dir)
    pub cwd: Option<PathBuf>,
    /// Custom path to the `claude` binary (default: discovered)
    pub cli_path: Option<PathBuf>,
    /// Additional environment variables for the subprocess
    pub env: HashMap<String, String>,
}

/// Permission mode — controls how tool executions are authorized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Standard: prompts for dangerous operations
    #[default]
    Default,
    /// Auto-accept file edit operations
    AcceptEdits,
    /// Bypass all permission checks
    BypassPermissions,
    /// Planning mode — no actual tool execution
    Plan,
    /// Don't prompt; deny if not pre-approved
    DontAsk,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
            PermissionMode::DontAsk => "dontAsk",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" => Ok(PermissionMode::AcceptEdits),
            "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
            "plan" => Ok(PermissionMode::Plan),
            "dontAsk" => Ok(PermissionMode::DontAsk),
            other => Err(format!(
                "unknown permission mode '{other}' (expected default, acceptEdits, bypassPermissions, plan or dontAsk)"
            )),
        }
    }
}

/// MCP server definition, serialized verbatim into `--mcp-config`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpServerConfig {
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}
