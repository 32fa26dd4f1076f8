use std::path::{Path, PathBuf};

use crate::types::QueryOptions;
use crate::{ClaudeStreamError, Result};

/// Install locations checked when `claude` is not on `PATH`, relative to the
/// home directory unless absolute.
const FALLBACK_LOCATIONS: &[&str] = &[
    ".npm-global/bin/claude",
    "/usr/local/bin/claude",
    ".local/bin/claude",
    "node_modules/.bin/claude",
    ".yarn/bin/claude",
];

/// The executable to run for `opts`: the `cli_path` override if set,
/// otherwise whatever [`find_cli`] locates.
///
/// An override is used as given; a missing file surfaces later as
/// [`ClaudeStreamError::NotFound`] when the process is started.
pub fn resolve(opts: &QueryOptions) -> Result<PathBuf> {
    match &opts.cli_path {
        Some(path) => Ok(path.clone()),
        None => find_cli(),
    }
}

/// Locate the `claude` executable on `PATH` or in common npm/yarn install
/// directories.
pub fn find_cli() -> Result<PathBuf> {
    if let Ok(path) = which::which("claude") {
        return Ok(path);
    }

    let home_dir = home::home_dir();
    if let Some(path) = FALLBACK_LOCATIONS
        .iter()
        .map(|loc| candidate(home_dir.as_deref(), loc))
        .find(|p| p.is_file())
    {
        return Ok(path);
    }

    tracing::debug!("claude executable not found on PATH or in fallback locations");
    Err(not_found_error(which::which("node").is_ok()))
}

fn candidate(home_dir: Option<&Path>, loc: &str) -> PathBuf {
    let loc = Path::new(loc);
    match home_dir {
        Some(home) if loc.is_relative() => home.join(loc),
        _ => loc.to_path_buf(),
    }
}

fn not_found_error(has_node: bool) -> ClaudeStreamError {
    let msg = if has_node {
        "install it with `npm install -g @anthropic-ai/claude-code`"
    } else {
        "Claude Code requires Node.js; install Node.js, then run `npm install -g @anthropic-ai/claude-code`"
    };
    ClaudeStreamError::NotFound(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let opts = QueryOptions {
            cli_path: Some("/opt/claude/bin/claude".into()),
            ..Default::default()
        };
        assert_eq!(resolve(&opts).unwrap(), PathBuf::from("/opt/claude/bin/claude"));
    }

    #[test]
    fn relative_candidates_join_home() {
        let home = Path::new("/home/dev");
        assert_eq!(
            candidate(Some(home), ".local/bin/claude"),
            PathBuf::from("/home/dev/.local/bin/claude")
        );
        assert_eq!(
            candidate(Some(home), "/usr/local/bin/claude"),
            PathBuf::from("/usr/local/bin/claude")
        );
    }

    #[test]
    fn not_found_mentions_node_when_missing() {
        let ClaudeStreamError::NotFound(msg) = not_found_error(false) else {
            panic!("expected NotFound")
        };
        assert!(msg.contains("requires Node.js"));

        let ClaudeStreamError::NotFound(msg) = not_found_error(true) else {
            panic!("expected NotFound")
        };
        assert!(msg.contains("npm install -g @anthropic-ai/claude-code"));
        assert!(!msg.contains("Node.js"));
    }
}
