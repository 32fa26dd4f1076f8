use futures::StreamExt;

use crate::stream::Query;
use crate::types::{Message, QueryOptions, ResultMessage};
use crate::{query, ClaudeStreamError, Result};

// ─── RunOutcome ───────────────────────────────────────────────────────────

/// Everything a query produced, collected after the child was reaped.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// Every message, in stream order.
    pub messages: Vec<Message>,
    /// Every error, in stream order.
    pub errors: Vec<ClaudeStreamError>,
    /// Copy of the terminal result message, if the CLI sent one.
    pub result: Option<ResultMessage>,
}

impl RunOutcome {
    /// The final text Claude produced, if any.
    pub fn result_text(&self) -> Option<&str> {
        self.result.as_ref().and_then(ResultMessage::result_text)
    }

    /// The first error that ended the run abnormally (process failure or
    /// read error). Decode failures of single lines are not included.
    pub fn failure(&self) -> Option<&ClaudeStreamError> {
        self.errors.iter().find(|e| !e.is_recoverable())
    }

    /// `true` when the process exited cleanly and sent a successful result.
    pub fn is_success(&self) -> bool {
        self.failure().is_none() && self.result.as_ref().is_some_and(ResultMessage::is_success)
    }
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Drive a single query to completion.
///
/// Fails only when the process cannot be started; everything after that is
/// reported inside the [`RunOutcome`].
///
/// # Example
///
/// ```rust,ignore
/// use claude_stream::{runner, QueryOptions};
///
/// let outcome = runner::run("say hello", QueryOptions::default()).await?;
/// println!("{}", outcome.result_text().unwrap_or(""));
/// ```
pub async fn run(prompt: impl Into<String>, opts: QueryOptions) -> Result<RunOutcome> {
    Ok(collect(query(prompt, opts)?).await)
}

/// Drain both streams of `query` concurrently until they close.
pub async fn collect(query: Query) -> RunOutcome {
    let (messages, errors) = query.into_parts();
    let (messages, errors): (Vec<Message>, Vec<ClaudeStreamError>) =
        futures::future::join(messages.collect(), errors.collect()).await;
    let result = messages.iter().rev().find_map(Message::as_result).cloned();
    RunOutcome {
        messages,
        errors,
        result,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SubprocessTransport;
    use tokio::process::Command;
    use tokio_util::sync::CancellationToken;

    fn mock_query(script: &str) -> Query {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        let mut transport = SubprocessTransport::new(QueryOptions::default());
        transport.connect_command(cmd).unwrap();
        Query::start(transport, CancellationToken::new()).unwrap()
    }

    const SUCCESS: &str = r#"echo '{"type":"system","subtype":"init","session_id":"s1"}'
echo '{"type":"result","subtype":"success","session_id":"s1","result":"hello world","num_turns":3,"total_cost_usd":0.012}'"#;

    #[tokio::test]
    async fn collect_success_returns_result_text() {
        let outcome = collect(mock_query(SUCCESS)).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.result_text(), Some("hello world"));
        assert_eq!(outcome.messages.len(), 2);
        let r = outcome.result.as_ref().unwrap();
        assert_eq!(r.session_id, "s1");
        assert_eq!(r.num_turns, 3);
        assert!((r.total_cost_usd - 0.012).abs() < 1e-9);
    }

    #[tokio::test]
    async fn collect_error_subtype_is_not_success() {
        let outcome = collect(mock_query(
            r#"echo '{"type":"result","subtype":"error_max_turns","is_error":true,"num_turns":10}'"#,
        ))
        .await;
        assert!(!outcome.is_success());
        assert!(outcome.failure().is_none());
        assert_eq!(outcome.result.as_ref().map(|r| r.num_turns), Some(10));
    }

    #[tokio::test]
    async fn collect_without_result_is_not_success() {
        let outcome = collect(mock_query("exit 0")).await;
        assert!(outcome.result.is_none());
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn process_failure_overrides_success_result() {
        let script = format!("{SUCCESS}\nexit 1");
        let outcome = collect(mock_query(&script)).await;
        assert!(outcome.result.is_some());
        assert!(matches!(
            outcome.failure(),
            Some(ClaudeStreamError::ProcessFailed { exit_code: 1, .. })
        ));
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn decode_failures_do_not_fail_the_run() {
        let script = format!("echo '{{oops'\n{SUCCESS}");
        let outcome = collect(mock_query(&script)).await;
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.failure().is_none());
        assert!(outcome.is_success());
    }
}
