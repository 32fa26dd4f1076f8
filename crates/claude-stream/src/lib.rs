//! `claude-stream` — typed message streams from the Claude CLI subprocess.
//!
//! This crate runs `claude --output-format stream-json --verbose --print
//! <prompt>` and turns the line-delimited JSON it writes into [`Message`]
//! values, delivered on one stream, with failures on a second one.
//!
//! # Architecture
//!
//! ```text
//! QueryOptions
//!     │
//!     ▼
//! SubprocessTransport ← spawns the CLI, buffers stderr, reaps on exit
//!     │
//!     ▼
//! LineDecoder         ← stdout bytes → JSON object / malformed / noise
//!     │
//!     ▼
//! parse_message       ← record → Message (or nothing, for unknown types)
//!     │
//!     ▼
//! Query               ← producer task + MessageStream / ErrorStream
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use claude_stream::{query, Message, QueryOptions};
//! use futures::StreamExt;
//!
//! let opts = QueryOptions {
//!     model: Some("claude-sonnet-4-6".into()),
//!     max_turns: Some(3),
//!     ..Default::default()
//! };
//!
//! let q = query("Write a hello-world Rust function.", opts)?;
//! let (mut messages, errors) = q.into_parts();
//! while let Some(msg) = messages.next().await {
//!     if let Message::Assistant(a) = msg {
//!         println!("{}", a.text());
//!     }
//! }
//! let errors: Vec<_> = errors.collect().await;
//! ```
//!
//! Both streams must be drained (or dropped) for the child process to be
//! cleaned up.

pub mod command;
pub mod config;
pub mod decoder;
pub mod discovery;
pub mod error;
pub mod parse;
pub mod runner;
pub mod stream;
pub mod transport;
pub mod types;


pub use error::ClaudeStreamError;
pub use runner::{run, RunOutcome};
pub use stream::{ErrorStream, MessageStream, Query};
pub use tokio_util::sync::CancellationToken;
pub use types::{
    AssistantMessage, ContentBlock, McpServerConfig, Message, PermissionMode, QueryOptions,
    ResultMessage, SystemMessage, UserMessage,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClaudeStreamError>;

/// Start a query against the Claude CLI.
///
/// Returns as soon as the process has started; messages and errors arrive
/// asynchronously on the returned [`Query`]. Must be called from within a
/// Tokio runtime.
///
/// # Errors
///
/// [`ClaudeStreamError::NotFound`] if the executable cannot be located,
/// [`ClaudeStreamError::ConnectionFailed`] if it cannot be started.
pub fn query(prompt: impl Into<String>, opts: QueryOptions) -> Result<Query> {
    query_with_cancel(prompt, opts, CancellationToken::new())
}

/// Like [`query`], but the child process is killed as soon as `cancel` is
/// triggered.
pub fn query_with_cancel(
    prompt: impl Into<String>,
    opts: QueryOptions,
    cancel: CancellationToken,
) -> Result<Query> {
    let prompt = prompt.into();
    let mut transport = transport::SubprocessTransport::new(opts);
    transport.connect(&prompt)?;
    Query::start(transport, cancel)
}
