use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::command::build_args;
use crate::decoder::LineDecoder;
use crate::discovery;
use crate::types::QueryOptions;
use crate::{ClaudeStreamError, Result};

/// Environment variable the CLI uses to identify which SDK launched it.
pub const ENTRYPOINT_ENV: &str = "CLAUDE_CODE_ENTRYPOINT";
pub const ENTRYPOINT: &str = "sdk-rust";

/// How long a failed exit waits for the rest of stderr. A grandchild that
/// inherited the pipe can keep it open long after the CLI itself is gone.
const STDERR_GRACE: Duration = Duration::from_millis(200);

// ─── TransportState ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No process yet.
    Idle,
    /// Process started; stdout not yet handed out.
    Connected,
    /// Stdout is being consumed.
    Draining,
    /// Process exited or was killed, and has been reaped.
    Closed,
}

// ─── SubprocessTransport ──────────────────────────────────────────────────

/// Owns one `claude --output-format stream-json` child process.
///
/// Stdout is handed to the caller as a [`LineDecoder`]; stderr is collected
/// by a background task and only surfaced when the process exits with a
/// non-zero status.
pub struct SubprocessTransport {
    opts: QueryOptions,
    state: TransportState,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    /// Stderr output collected by a background reader task.
    stderr_buf: Arc<Mutex<String>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl SubprocessTransport {
    pub fn new(opts: QueryOptions) -> Self {
        Self {
            opts,
            state: TransportState::Idle,
            child: None,
            stdout: None,
            stderr_buf: Arc::new(Mutex::new(String::new())),
            stderr_task: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// OS pid of the child while it is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Start the CLI for `prompt` (`Idle → Connected`).
    ///
    /// `CLAUDECODE` is removed from the environment so this works both from a
    /// terminal and from inside a running Claude session.
    pub fn connect(&mut self, prompt: &str) -> Result<()> {
        if self.state != TransportState::Idle {
            return Err(ClaudeStreamError::ConnectionFailed(
                "transport already connected".into(),
            ));
        }

        if let Some(cwd) = self.opts.cwd.as_deref().filter(|d| !d.is_dir()) {
            return Err(ClaudeStreamError::ConnectionFailed(format!(
                "working directory {} does not exist",
                cwd.display()
            )));
        }

        let exe = discovery::resolve(&self.opts)?;
        let cmd = self.build_command(&exe, prompt);
        self.start(cmd, &exe)
    }

    fn build_command(&self, exe: &Path, prompt: &str) -> Command {
        let mut cmd = Command::new(exe);
        cmd.args(build_args(prompt, &self.opts));
        cmd.env_remove("CLAUDECODE");
        cmd.env(ENTRYPOINT_ENV, ENTRYPOINT);
        for (k, v) in &self.opts.env {
            cmd.env(k, v);
        }
        if let Some(cwd) = &self.opts.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    /// Start an arbitrary command in place of the CLI.
    /// Used in unit tests to script the child's output and exit status.
    #[cfg(test)]
    pub(crate) fn connect_command(&mut self, cmd: Command) -> Result<()> {
        let exe = Path::new(cmd.as_std().get_program()).to_path_buf();
        self.start(cmd, &exe)
    }

    fn start(&mut self, mut cmd: Command, exe: &Path) -> Result<()> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ClaudeStreamError::NotFound(format!("no executable at {}", exe.display()))
            }
            _ => ClaudeStreamError::ConnectionFailed(format!("{}: {e}", exe.display())),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClaudeStreamError::ConnectionFailed("stdout not captured".into()))?;

        // Stderr is drained concurrently so a chatty child never blocks on a
        // full pipe; the text is only read back on abnormal exit.
        self.stderr_task = child.stderr.take().map(|stderr| {
            let buf = Arc::clone(&self.stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = Vec::new();
                while let Ok(n) = reader.read_until(b'\n', &mut line).await {
                    if n == 0 {
                        break;
                    }
                    if let Ok(mut b) = buf.lock() {
                        b.push_str(&String::from_utf8_lossy(&line));
                    }
                    line.clear();
                }
            })
        });

        tracing::info!(exe = %exe.display(), pid = ?child.id(), "spawned claude subprocess");
        self.child = Some(child);
        self.stdout = Some(stdout);
        self.state = TransportState::Connected;
        Ok(())
    }

    /// Hand out the stdout decoder (`Connected → Draining`). Only once.
    pub fn take_output(&mut self) -> Result<LineDecoder<ChildStdout>> {
        match (self.state, self.stdout.take()) {
            (TransportState::Connected, Some(stdout)) => {
                self.state = TransportState::Draining;
                Ok(LineDecoder::new(stdout))
            }
            _ => Err(ClaudeStreamError::ConnectionFailed("not connected".into())),
        }
    }

    /// Wait for the child to exit after its output ended
    /// (`Draining → Closed`).
    ///
    /// Returns `ProcessFailed` with the exit code and captured stderr when
    /// the exit status is non-zero, `None` on success or if there is no
    /// process to wait for.
    pub async fn wait_exit(&mut self) -> Option<ClaudeStreamError> {
        let child = self.child.as_mut()?;
        let status = match child.wait().await {
            Ok(s) => s,
            Err(e) => return Some(ClaudeStreamError::Io(e)),
        };
        self.child = None;
        self.state = TransportState::Closed;

        if status.success() {
            if let Some(task) = self.stderr_task.take() {
                task.abort();
            }
            tracing::debug!("claude subprocess exited cleanly");
            return None;
        }

        let stderr = self.collect_stderr().await;
        let exit_code = status.code().unwrap_or(-1);
        tracing::warn!(exit_code, "claude subprocess failed");
        Some(ClaudeStreamError::ProcessFailed { exit_code, stderr })
    }

    /// Kill and reap the child. Idempotent; never reports an exit error.
    pub async fn disconnect(&mut self) {
        if let Some(mut child) = self.child.take() {
            // `kill` waits for the process after signalling it.
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "kill failed; process already gone");
            }
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        self.stdout = None;
        self.state = TransportState::Closed;
    }

    /// Wait briefly for the stderr reader to hit EOF, then return whatever
    /// it captured.
    async fn collect_stderr(&mut self) -> String {
        if let Some(mut task) = self.stderr_task.take() {
            if tokio::time::timeout(STDERR_GRACE, &mut task).await.is_err() {
                tracing::debug!("stderr still open after exit; using partial capture");
                task.abort();
            }
        }
        self.stderr_buf
            .lock()
            .map(|b| b.trim_end().to_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::LineRecord;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn is_alive(pid: u32) -> bool {
        std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn state_machine_on_clean_exit() {
        let mut t = SubprocessTransport::new(QueryOptions::default());
        assert_eq!(t.state(), TransportState::Idle);
        t.connect_command(sh(r#"echo '{"type":"user"}'"#)).unwrap();
        assert_eq!(t.state(), TransportState::Connected);

        let mut out = t.take_output().unwrap();
        assert_eq!(t.state(), TransportState::Draining);
        assert!(matches!(out.next_record().await.unwrap(), Some(LineRecord::Object(_))));
        assert!(out.next_record().await.unwrap().is_none());

        assert!(t.wait_exit().await.is_none());
        assert_eq!(t.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn output_can_only_be_taken_once() {
        let mut t = SubprocessTransport::new(QueryOptions::default());
        assert!(t.take_output().is_err());
        t.connect_command(sh("true")).unwrap();
        assert!(t.take_output().is_ok());
        assert!(matches!(
            t.take_output(),
            Err(ClaudeStreamError::ConnectionFailed(_))
        ));
        t.disconnect().await;
    }

    #[tokio::test]
    async fn non_zero_exit_reports_code_and_stderr() {
        let mut t = SubprocessTransport::new(QueryOptions::default());
        t.connect_command(sh("echo 'auth expired' >&2; exit 3")).unwrap();
        let mut out = t.take_output().unwrap();
        while out.next_record().await.unwrap().is_some() {}

        match t.wait_exit().await {
            Some(ClaudeStreamError::ProcessFailed { exit_code, stderr }) => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "auth expired");
            }
            other => panic!("expected ProcessFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_exit_does_not_wait_for_inherited_stderr() {
        let mut t = SubprocessTransport::new(QueryOptions::default());
        t.connect_command(sh("sleep 5 >/dev/null & exit 0")).unwrap();
        let mut out = t.take_output().unwrap();
        let started = std::time::Instant::now();
        while out.next_record().await.unwrap().is_some() {}

        let exit = tokio::time::timeout(Duration::from_secs(2), t.wait_exit())
            .await
            .expect("wait_exit blocked on a grandchild holding stderr");
        assert!(exit.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn failed_exit_reports_partial_stderr_when_pipe_stays_open() {
        let mut t = SubprocessTransport::new(QueryOptions::default());
        t.connect_command(sh("echo 'boom' >&2; sleep 5 >/dev/null & exit 4"))
            .unwrap();
        let mut out = t.take_output().unwrap();
        while out.next_record().await.unwrap().is_some() {}

        let exit = tokio::time::timeout(Duration::from_secs(2), t.wait_exit())
            .await
            .expect("wait_exit blocked on a grandchild holding stderr");
        match exit {
            Some(ClaudeStreamError::ProcessFailed { exit_code, stderr }) => {
                assert_eq!(exit_code, 4);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected ProcessFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_kills_running_child_and_is_idempotent() {
        let mut t = SubprocessTransport::new(QueryOptions::default());
        t.connect_command(sh("sleep 30")).unwrap();
        let pid = t.pid().unwrap();
        assert!(is_alive(pid));

        t.disconnect().await;
        assert_eq!(t.state(), TransportState::Closed);
        assert!(!is_alive(pid));

        t.disconnect().await;
        assert!(t.wait_exit().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_after_exit_is_safe() {
        let mut t = SubprocessTransport::new(QueryOptions::default());
        t.connect_command(sh("exit 0")).unwrap();
        let mut out = t.take_output().unwrap();
        while out.next_record().await.unwrap().is_some() {}
        assert!(t.wait_exit().await.is_none());
        t.disconnect().await;
        t.disconnect().await;
        assert_eq!(t.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn missing_executable_is_not_found() {
        let mut t = SubprocessTransport::new(QueryOptions {
            cli_path: Some("/nonexistent/bin/claude".into()),
            ..Default::default()
        });
        let err = t.connect("hi").unwrap_err();
        assert!(matches!(err, ClaudeStreamError::NotFound(_)), "{err:?}");
        assert_eq!(t.state(), TransportState::Idle);
    }

    #[tokio::test]
    async fn non_executable_file_is_connection_failed() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut t = SubprocessTransport::new(QueryOptions {
            cli_path: Some(file.path().to_path_buf()),
            ..Default::default()
        });
        let err = t.connect("hi").unwrap_err();
        assert!(matches!(err, ClaudeStreamError::ConnectionFailed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn connect_twice_is_rejected() {
        let mut t = SubprocessTransport::new(QueryOptions {
            cli_path: Some("true".into()),
            ..Default::default()
        });
        t.connect("hi").unwrap();
        assert!(matches!(
            t.connect("hi"),
            Err(ClaudeStreamError::ConnectionFailed(_))
        ));
        t.disconnect().await;
    }

    #[test]
    fn command_carries_args_env_and_cwd() {
        let t = SubprocessTransport::new(QueryOptions {
            model: Some("claude-sonnet-4-6".into()),
            cwd: Some("/tmp".into()),
            env: [("EXTRA_FLAG".to_string(), "on".to_string())].into(),
            ..Default::default()
        });
        let cmd = t.build_command(Path::new("/usr/bin/claude"), "hi");
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "/usr/bin/claude");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args.last().copied(), Some(std::ffi::OsStr::new("hi")));
        assert!(args.contains(&std::ffi::OsStr::new("--model")));
        assert_eq!(std_cmd.get_current_dir(), Some(Path::new("/tmp")));

        let envs: std::collections::HashMap<_, _> = std_cmd.get_envs().collect();
        assert_eq!(
            envs.get(std::ffi::OsStr::new(ENTRYPOINT_ENV)),
            Some(&Some(std::ffi::OsStr::new("sdk-rust")))
        );
        assert_eq!(
            envs.get(std::ffi::OsStr::new("EXTRA_FLAG")),
            Some(&Some(std::ffi::OsStr::new("on")))
        );
        // removed, not inherited
        assert_eq!(envs.get(std::ffi::OsStr::new("CLAUDECODE")), Some(&None));
    }

    #[tokio::test]
    async fn child_sees_entrypoint_env() {
        let mut t = SubprocessTransport::new(QueryOptions::default());
        let mut cmd = sh(r#"printf '{"entry":"%s"}\n' "$CLAUDE_CODE_ENTRYPOINT""#);
        cmd.env(ENTRYPOINT_ENV, ENTRYPOINT);
        t.connect_command(cmd).unwrap();
        let mut out = t.take_output().unwrap();
        let Some(LineRecord::Object(m)) = out.next_record().await.unwrap() else {
            panic!("expected object line")
        };
        assert_eq!(m["entry"], "sdk-rust");
        t.disconnect().await;
    }
}
