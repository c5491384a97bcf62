//! Handler Chain — the pluggable middleware surface for external command
//! execution, plus the four other pluggable file-I/O handlers (call-rewrite,
//! open, readdir, stat) that let a host embed this interpreter against a
//! virtual filesystem instead of the real one.
//!
//! The default exec handler does real PATH lookup (via
//! `command_resolution`) and spawns a child process, forwarding SIGINT on
//! cancellation and escalating to SIGKILL after a grace period — this is
//! the one place in the crate that talks to the OS process/signal API
//! directly, so it goes through `libc` rather than the sync `FileSystem`
//! abstraction everything else uses.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use crate::interpreter::command_resolution::{build_command_path, is_executable_mode, is_path_command, split_path};
use crate::interpreter::interpreter::FileStat;
use crate::interpreter::types::ExecResult;

/// Grace period between forwarding SIGINT and escalating to SIGKILL, per
/// §4.7's "default 2 s".
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Per-call context an exec/call handler receives: the expanded argv's
/// surrounding directory and environment, plus a cancellation flag the
/// default handler polls while the child runs.
pub struct HandlerContext<'a> {
    pub cwd: &'a str,
    pub env: &'a HashMap<String, String>,
    pub stdin: &'a str,
    pub cancelled: &'a std::sync::atomic::AtomicBool,
}

/// The three outcomes a handler in the chain can produce, per §4.7 and §7.
#[derive(Debug, Clone)]
pub enum HandlerError {
    /// A bare exit status: sets the shell's `$?` and stops there.
    ExitStatus(i32),
    /// An exit status wrapped with a message: same effect as `ExitStatus`
    /// but the message is surfaced as a "Surfaced handler error" (§7 tier 2).
    WrappedExitStatus(i32, String),
    /// Anything else: fatal, unwinds the Runner (§7 tier 3).
    Fatal(String),
}

impl HandlerError {
    /// Exit code a statement should record for this error, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            HandlerError::ExitStatus(n) | HandlerError::WrappedExitStatus(n, _) => Some(*n),
            HandlerError::Fatal(_) => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, HandlerError::Fatal(_))
    }
}

/// `(ctx, args) -> Result<ExecResult, HandlerError>`. A zero-error return
/// from the innermost (default) handler means exit 0 with whatever output
/// the child produced; middlewares wrap this to add logging, sandboxing,
/// argv rewriting, etc. around the default spawn-and-wait behavior.
pub type ExecHandlerFunc = Arc<dyn Fn(&HandlerContext, &str, &[String]) -> Result<ExecResult, HandlerError> + Send + Sync>;

/// Runs before exec/builtin dispatch and may rewrite the expanded argv.
/// A non-`Ok` return is always fatal (§4.7).
pub type CallHandlerFunc = Arc<dyn Fn(&HandlerContext, &[String]) -> Result<Vec<String>, HandlerError> + Send + Sync>;

/// Pluggable file open. The returned handle is read or written depending on
/// `write`; a handler backing a non-real file still has to behave like a
/// stream since the core bridges it through a pipe for input redirects.
pub type OpenHandlerFunc = Arc<dyn Fn(&str, bool) -> std::io::Result<Vec<u8>> + Send + Sync>;

/// Pluggable directory listing.
pub type ReadDirHandlerFunc = Arc<dyn Fn(&str) -> std::io::Result<Vec<String>> + Send + Sync>;

/// Pluggable `stat(2)`-equivalent lookup, backing the `-e -f -d ...` test
/// operators in §4.6.1.
pub type StatHandlerFunc = Arc<dyn Fn(&str) -> std::io::Result<FileStat> + Send + Sync>;

/// Compose an outer middleware around an inner handler: `outer(inner(...))`.
/// The outer closure decides whether/how to call `inner` — it may run
/// before, run after, rewrite the result, or skip the call entirely.
pub fn wrap_exec_handler(
    inner: ExecHandlerFunc,
    outer: impl Fn(&HandlerContext, &str, &[String], &ExecHandlerFunc) -> Result<ExecResult, HandlerError> + Send + Sync + 'static,
) -> ExecHandlerFunc {
    Arc::new(move |ctx, cmd, args| outer(ctx, cmd, args, &inner))
}

/// The default exec handler: PATH lookup via `command_resolution`, spawn,
/// wait, and forward the argv's name as `argv[0]`. Cancellation is
/// cooperative: the caller is expected to flip `ctx.cancelled` and this
/// handler polls it while waiting on the child, sending SIGINT immediately
/// and SIGKILL after [`DEFAULT_KILL_GRACE`].
pub fn default_exec_handler() -> ExecHandlerFunc {
    Arc::new(|ctx, command, args| {
        let path = resolve_executable(ctx, command)?;

        let mut cmd = Command::new(&path);
        cmd.args(args)
            .current_dir(ctx.cwd)
            .envs(ctx.env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| HandlerError::Fatal(format!("{}: {}", command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            use std::io::Write;
            let _ = stdin.write_all(ctx.stdin.as_bytes());
        }

        let pid = child.id() as libc::pid_t;
        let start = std::time::Instant::now();
        let mut sent_interrupt = false;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if ctx.cancelled.load(std::sync::atomic::Ordering::SeqCst) {
                        if !sent_interrupt {
                            unsafe { libc::kill(pid, libc::SIGINT) };
                            sent_interrupt = true;
                        } else if start.elapsed() >= DEFAULT_KILL_GRACE {
                            unsafe { libc::kill(pid, libc::SIGKILL) };
                        }
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => return Err(HandlerError::Fatal(format!("{}: {}", command, e))),
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout);
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }

        let exit_code = status.code().unwrap_or_else(|| 128 + signal_number(&status));
        Ok(ExecResult::new(stdout, stderr, exit_code))
    })
}

#[cfg(unix)]
fn signal_number(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or(0)
}

#[cfg(not(unix))]
fn signal_number(_status: &std::process::ExitStatus) -> i32 {
    0
}

fn resolve_executable(ctx: &HandlerContext, command: &str) -> Result<String, HandlerError> {
    if is_path_command(command) {
        let full = if command.starts_with('/') {
            command.to_string()
        } else {
            format!("{}/{}", ctx.cwd, command)
        };
        return Ok(full);
    }

    let path_env = ctx.env.get("PATH").map(|s| s.as_str()).unwrap_or(crate::interpreter::command_resolution::DEFAULT_PATH);
    for dir in split_path(path_env) {
        let candidate = build_command_path(dir, command);
        if let Ok(meta) = std::fs::metadata(&candidate) {
            if meta.is_file() && is_executable_mode(std::os::unix::fs::PermissionsExt::mode(&meta.permissions())) {
                return Ok(candidate);
            }
        }
    }

    Err(HandlerError::ExitStatus(127))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn resolve_executable_rejects_unknown_command() {
        let env = HashMap::from([("PATH".to_string(), "/nonexistent/dir".to_string())]);
        let cancelled = AtomicBool::new(false);
        let ctx = HandlerContext { cwd: "/", env: &env, stdin: "", cancelled: &cancelled };

        let err = resolve_executable(&ctx, "definitely-not-a-real-command").unwrap_err();
        assert!(matches!(err, HandlerError::ExitStatus(127)));
    }

    #[test]
    fn resolve_executable_passes_through_path_commands() {
        let env = HashMap::new();
        let cancelled = AtomicBool::new(false);
        let ctx = HandlerContext { cwd: "/work", env: &env, stdin: "", cancelled: &cancelled };

        assert_eq!(resolve_executable(&ctx, "/bin/echo").unwrap(), "/bin/echo");
        assert_eq!(resolve_executable(&ctx, "./run.sh").unwrap(), "/work/./run.sh");
    }
}
