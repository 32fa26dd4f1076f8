use anyhow::{Context, Result};
use claude_stream::{CancellationToken, ClaudeStreamError, Message, QueryOptions};
use futures::StreamExt;

use crate::output::Printer;
use crate::Cli;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(cli: Cli) -> Result<()> {
    let opts = build_options(&cli)?;
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(drive(&cli.prompt, opts, cli.json))
}

async fn drive(prompt: &str, opts: QueryOptions, json: bool) -> Result<()> {
    tracing::debug!(?opts, "starting query");
    let query = claude_stream::query(prompt, opts).context("failed to start Claude Code")?;
    let cancel = query.cancellation_token();
    let (mut messages, mut errors) = query.into_parts();
    let mut printer = Printer::new(json);
    let mut failure: Option<ClaudeStreamError> = None;
    let mut last_result_ok = None;

    let mut interrupted = false;
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut signals = true;
    let mut messages_open = true;
    let mut errors_open = true;
    while messages_open || errors_open {
        tokio::select! {
            msg = messages.next(), if messages_open => match msg {
                Some(msg) => {
                    if let Message::Result(r) = &msg {
                        last_result_ok = Some(r.is_success());
                    }
                    printer.message(&msg)?;
                }
                None => messages_open = false,
            },
            err = errors.next(), if errors_open => match err {
                Some(err) if err.is_recoverable() => {
                    tracing::warn!(error = %err, "skipping undecodable line");
                }
                Some(err) => failure = Some(err),
                None => errors_open = false,
            },
            res = &mut ctrl_c, if signals => match res {
                Ok(()) => {
                    ctrl_c.set(tokio::signal::ctrl_c());
                    on_interrupt(&mut interrupted, &cancel)?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                    signals = false;
                }
            },
        }
    }

    if interrupted {
        anyhow::bail!("interrupted");
    }

    if let Some(err) = failure {
        return Err(err).context("Claude Code failed");
    }
    match last_result_ok {
        Some(true) => Ok(()),
        Some(false) => anyhow::bail!("query ended with an error result"),
        None => anyhow::bail!("Claude Code exited without a result message"),
    }
}

/// First Ctrl-C cancels the query and keeps draining until the child is
/// reaped; a second one gives up immediately.
fn on_interrupt(interrupted: &mut bool, cancel: &CancellationToken) -> Result<()> {
    if *interrupted {
        anyhow::bail!("interrupted twice; not waiting for Claude Code to exit");
    }
    eprintln!("interrupted; stopping Claude Code (Ctrl-C again to quit now)");
    cancel.cancel();
    *interrupted = true;
    Ok(())
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options file (if any) first, then command-line overrides.
fn build_options(cli: &Cli) -> Result<QueryOptions> {
    let mut opts = match &cli.config {
        Some(path) => QueryOptions::load(path)
            .with_context(|| format!("failed to load options from {}", path.display()))?,
        None => QueryOptions::default(),
    };

    if let Some(model) = &cli.model {
        opts.model = Some(model.clone());
    }
    if let Some(max_turns) = cli.max_turns {
        opts.max_turns = Some(max_turns);
    }
    if let Some(mode) = cli.permission_mode {
        opts.permission_mode = mode;
    }
    if !cli.allowed_tools.is_empty() {
        opts.allowed_tools = cli.allowed_tools.clone();
    }
    if !cli.disallowed_tools.is_empty() {
        opts.disallowed_tools = cli.disallowed_tools.clone();
    }
    if let Some(path) = &cli.cli_path {
        opts.cli_path = Some(path.clone());
    }
    if let Some(cwd) = &cli.cwd {
        opts.cwd = Some(cwd.clone());
    }
    if let Some(resume) = &cli.resume {
        opts.resume = Some(resume.clone());
    }
    if cli.continue_conversation {
        opts.continue_conversation = true;
    }
    Ok(opts)
}
