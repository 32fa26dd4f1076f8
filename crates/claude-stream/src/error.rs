use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaudeStreamError {
    /// The `claude` executable could not be located or does not exist.
    #[error("Claude Code not found: {0}")]
    NotFound(String),

    /// The process could not be started for any other reason.
    #[error("Failed to start Claude Code: {0}")]
    ConnectionFailed(String),

    /// A structured-looking stdout line was not a valid JSON object.
    #[error("Failed to decode stream-json line: {source}\n  line: {line}")]
    DecodeFailed {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// The process exited unsuccessfully. `exit_code` is -1 when it was
    /// terminated by a signal.
    #[error("{}", process_failed_message(.exit_code, .stderr))]
    ProcessFailed { exit_code: i32, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClaudeStreamError {
    /// Whether the pipeline can keep delivering messages after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClaudeStreamError::DecodeFailed { .. })
    }
}

fn process_failed_message(exit_code: &i32, stderr: &str) -> String {
    let head = if *exit_code < 0 {
        "Claude Code process terminated by signal".to_string()
    } else {
        format!("Claude Code process exited with code {exit_code}")
    };
    if stderr.is_empty() {
        head
    } else {
        format!("{head}\nstderr: {stderr}")
    }
}
