use std::path::Path;

use crate::types::QueryOptions;
use crate::{ClaudeStreamError, Result};

impl QueryOptions {
    /// Load options from a YAML file.
    ///
    /// Every key is optional; absent keys keep their [`Default`] value.
    ///
    /// ```yaml
    /// model: claude-sonnet-4-6
    /// max_turns: 5
    /// permission_mode: acceptEdits
    /// allowed_tools: [Read, Grep]
    /// mcp_servers:
    ///   fs:
    ///     type: stdio
    ///     command: mcp-fs
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(ClaudeStreamError::Io)?;
        Self::from_yaml(&text)
            .map_err(|e| ClaudeStreamError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse options from a YAML document. An empty document yields defaults.
    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}
