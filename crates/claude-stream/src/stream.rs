use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::process::ChildStdout;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::decoder::{LineDecoder, LineRecord};
use crate::parse::parse_message;
use crate::transport::SubprocessTransport;
use crate::types::Message;
use crate::ClaudeStreamError;

// ─── Query ────────────────────────────────────────────────────────────────

/// A running query: the message stream, the error stream, and the handle
/// used to cancel it.
///
/// Both streams end once the child process has been reaped. Dropping both
/// streams has the same effect as [`Query::cancel`].
///
/// ```rust,ignore
/// use claude_stream::{query, Message, QueryOptions};
/// use futures::StreamExt;
///
/// let q = query("say hello", QueryOptions::default())?;
/// let (mut messages, mut errors) = q.into_parts();
/// while let Some(msg) = messages.next().await {
///     if let Message::Result(r) = msg {
///         println!("result: {:?}", r.result_text());
///     }
/// }
/// while let Some(err) = errors.next().await {
///     eprintln!("{err}");
/// }
/// ```
pub struct Query {
    pub messages: MessageStream,
    pub errors: ErrorStream,
    cancel: CancellationToken,
    pid: Option<u32>,
    task: JoinHandle<()>,
}

impl Query {
    /// Start the pipeline for an already-connected transport.
    pub(crate) fn start(
        mut transport: SubprocessTransport,
        cancel: CancellationToken,
    ) -> crate::Result<Self> {
        let pid = transport.pid();
        let output = match transport.take_output() {
            Ok(output) => output,
            Err(e) => {
                // Nothing will ever drive this transport; don't leave the
                // child running.
                tokio::spawn(async move { transport.disconnect().await });
                return Err(e);
            }
        };

        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(
            Pipeline {
                transport,
                output,
                msg_tx,
                err_tx,
                cancel: cancel.clone(),
            }
            .run(),
        );

        Ok(Query {
            messages: MessageStream { rx: msg_rx },
            errors: ErrorStream { rx: err_rx },
            cancel,
            pid,
            task,
        })
    }

    /// Terminate the child process. Both streams close without further
    /// delivery once it has been reaped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this query when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// OS pid of the child process.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn into_parts(self) -> (MessageStream, ErrorStream) {
        (self.messages, self.errors)
    }

    /// Wait until the producer task has finished, i.e. the child has been
    /// reaped and both streams are closed.
    pub async fn finished(self) {
        let _ = self.task.await;
    }
}

// ─── Streams ──────────────────────────────────────────────────────────────

/// Typed messages, in the order the CLI wrote them. A `Result` message, if
/// any, is always the last item.
pub struct MessageStream {
    rx: mpsc::UnboundedReceiver<Message>,
}

/// Decode failures (as they happen) and at most one process failure (after
/// every message of the run has been sent).
pub struct ErrorStream {
    rx: mpsc::UnboundedReceiver<ClaudeStreamError>,
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Stream for ErrorStream {
    type Item = ClaudeStreamError;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────

/// The producer side of one query. Sole reader of the child's stdout and
/// sole writer of both channels.
struct Pipeline {
    transport: SubprocessTransport,
    output: LineDecoder<ChildStdout>,
    msg_tx: mpsc::UnboundedSender<Message>,
    err_tx: mpsc::UnboundedSender<ClaudeStreamError>,
    cancel: CancellationToken,
}

enum Drained {
    Eof,
    Cancelled,
    Failed,
}

impl Pipeline {
    async fn run(mut self) {
        let drained = self.drain().await;

        if matches!(drained, Drained::Eof) {
            let exit = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                exit = self.transport.wait_exit() => exit,
            };
            if let Some(err) = exit {
                let _ = self.err_tx.send(err);
            }
        }

        // Reap before the senders drop so a closed stream always means the
        // process is gone.
        self.transport.disconnect().await;
        tracing::debug!(outcome = drained.label(), "query pipeline finished");
    }

    async fn drain(&mut self) -> Drained {
        let mut got_result = false;
        loop {
            let (msg_tx, err_tx) = (&self.msg_tx, &self.err_tx);
            let record = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::debug!("query cancelled");
                    return Drained::Cancelled;
                }
                _ = async { tokio::join!(msg_tx.closed(), err_tx.closed()) } => {
                    tracing::debug!("both streams dropped; stopping query");
                    return Drained::Cancelled;
                }
                record = self.output.next_record() => record,
            };

            match record {
                Ok(None) => return Drained::Eof,
                Err(e) => {
                    let _ = self.err_tx.send(ClaudeStreamError::Io(e));
                    return Drained::Failed;
                }
                Ok(Some(LineRecord::Noise(line))) => {
                    if !line.is_empty() {
                        tracing::debug!(line = %line, "ignoring non-JSON output line");
                    }
                }
                Ok(Some(LineRecord::Malformed { line, source })) => {
                    let _ = self
                        .err_tx
                        .send(ClaudeStreamError::DecodeFailed { line, source });
                }
                Ok(Some(LineRecord::Object(record))) => {
                    let Some(msg) = parse_message(&record) else {
                        continue;
                    };
                    if got_result {
                        tracing::warn!("dropping message received after the result message");
                        continue;
                    }
                    got_result = msg.is_result();
                    let _ = self.msg_tx.send(msg);
                }
            }
        }
    }
}

impl Drained {
    fn label(&self) -> &'static str {
        match self {
            Drained::Eof => "eof",
            Drained::Cancelled => "cancelled",
            Drained::Failed => "read_error",
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
