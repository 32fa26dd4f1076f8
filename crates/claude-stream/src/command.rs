use std::collections::BTreeMap;

use crate::types::{McpServerConfig, PermissionMode, QueryOptions};

// ─── Argument builder ─────────────────────────────────────────────────────

/// Build the argument vector (excluding the executable) for one query.
///
/// Output is always `--output-format stream-json --verbose`; the prompt is
/// the final argument, after `--print`.
pub fn build_args(prompt: &str, opts: &QueryOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--output-format".into(),
        "stream-json".into(),
        "--verbose".into(),
    ];

    let mut flag = |name: &str, value: String| {
        args.push(name.into());
        args.push(value);
    };

    if let Some(sp) = &opts.system_prompt {
        flag("--system-prompt", sp.clone());
    }

    if let Some(append) = &opts.append_system_prompt {
        flag("--append-system-prompt", append.clone());
    }

    if !opts.allowed_tools.is_empty() {
        flag("--allowedTools", opts.allowed_tools.join(","));
    }

    if let Some(max_turns) = opts.max_turns {
        flag("--max-turns", max_turns.to_string());
    }

    if !opts.disallowed_tools.is_empty() {
        flag("--disallowedTools", opts.disallowed_tools.join(","));
    }

    if let Some(model) = &opts.model {
        flag("--model", model.clone());
    }

    if let Some(tool) = &opts.permission_prompt_tool_name {
        flag("--permission-prompt-tool", tool.clone());
    }

    if opts.permission_mode != PermissionMode::Default {
        flag("--permission-mode", opts.permission_mode.as_str().into());
    }

    if opts.continue_conversation {
        args.push("--continue".into());
    }

    if let Some(resume) = &opts.resume {
        args.push("--resume".into());
        args.push(resume.clone());
    }

    if !opts.mcp_servers.is_empty() {
        args.push("--mcp-config".into());
        args.push(mcp_config_json(&opts.mcp_servers));
    }

    args.push("--print".into());
    args.push(prompt.into());
    args
}

/// Serialise MCP server entries into the JSON blob expected by
/// `claude --mcp-config '...'`.
///
/// Format: `{"mcpServers":{"<name>":{"type":"stdio","command":"...",...}}}`
pub fn mcp_config_json(servers: &BTreeMap<String, McpServerConfig>) -> String {
    serde_json::json!({ "mcpServers": servers }).to_string()
}
