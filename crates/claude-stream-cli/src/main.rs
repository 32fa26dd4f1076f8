mod cmd;
mod output;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "claude-stream",
    about = "Run one Claude Code query and print its messages as they arrive",
    version
)]
pub struct Cli {
    /// Prompt to send
    prompt: String,

    /// YAML file with query options (model, tools, MCP servers, ...)
    #[arg(long, env = "CLAUDE_STREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Model override
    #[arg(long)]
    model: Option<String>,

    /// Maximum agent turns
    #[arg(long)]
    max_turns: Option<u32>,

    /// Permission mode (default, acceptEdits, bypassPermissions, plan, dontAsk)
    #[arg(long)]
    permission_mode: Option<claude_stream::PermissionMode>,

    /// Tools to pre-approve (comma separated)
    #[arg(long, value_delimiter = ',')]
    allowed_tools: Vec<String>,

    /// Tools to deny (comma separated)
    #[arg(long, value_delimiter = ',')]
    disallowed_tools: Vec<String>,

    /// Path to the `claude` executable (default: discovered)
    #[arg(long)]
    cli_path: Option<PathBuf>,

    /// Working directory for the CLI process
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Session ID to resume
    #[arg(long)]
    resume: Option<String>,

    /// Continue the most recent conversation
    #[arg(long = "continue")]
    continue_conversation: bool,

    /// Print one JSON object per message instead of text
    #[arg(long, short = 'j')]
    json: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cmd::query::run(cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
