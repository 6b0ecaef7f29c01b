//! Child-process runner used by every chain step and query helper.
//!
//! [`ProcessRunner`] is the seam the chain engine talks to; [`CommandRunner`] is
//! the real implementation that spawns `git` (or a shell) in a working path.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::{GitError, Result};

/// Default cap on captured bytes per stream.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 10_000_000;

/// Output of a child that exited with zero or an allowlisted code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl Captured {
    /// Combined output: stdout followed by stderr.
    pub fn output(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        buf.extend_from_slice(&self.stdout);
        buf.extend_from_slice(&self.stderr);
        buf
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// Executes programs on behalf of a chain.
///
/// Implementations must honor the expected-exit allowlist: an allowlisted
/// non-zero code is reported through [`Captured::exit_code`], any other
/// non-zero code is an error carrying the combined output.
pub trait ProcessRunner: Clone {
    /// Run `program args…` to completion.
    fn exec_take(&self, program: &str, args: &[&str]) -> Result<Captured>;

    /// Run `script` through the configured shell.
    fn exec_shell(&self, script: &str) -> Result<Captured>;

    /// Fresh descriptor with the same settings but an empty allowlist.
    fn new_config(&self) -> Self;

    fn set_path(&mut self, path: &Path);

    fn set_debug_mode(&mut self, debug: bool);

    /// Report `code` as an exit code instead of an error.
    fn expect_exit(&mut self, code: i32, label: &str);

    /// Run and return the combined output, dropping the exit code.
    fn exec(&self, program: &str, args: &[&str]) -> Result<Vec<u8>> {
        self.exec_take(program, args).map(|captured| captured.output())
    }
}

/// Runner that spawns real child processes.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    path: PathBuf,
    debug: bool,
    shell_type: Option<String>,
    shell_flag: Option<String>,
    script_shell: (String, String),
    expected_exits: BTreeMap<i32, String>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
    env: BTreeMap<String, String>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            debug: false,
            shell_type: None,
            shell_flag: None,
            script_shell: ("sh".to_string(), "-c".to_string()),
            expected_exits: BTreeMap::new(),
            timeout: None,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            env: BTreeMap::new(),
        }
    }
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_debug_mode(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_shell_type(mut self, shell: impl Into<String>) -> Self {
        self.shell_type = Some(shell.into());
        self
    }

    pub fn with_shell_flag(mut self, flag: impl Into<String>) -> Self {
        self.shell_flag = Some(flag.into());
        self
    }

    /// Shell used by [`ProcessRunner::exec_shell`] when shell mode is off.
    pub fn with_script_shell(mut self, shell: impl Into<String>, flag: impl Into<String>) -> Self {
        self.script_shell = (shell.into(), flag.into());
        self
    }

    pub fn with_expect_exit(mut self, code: i32, label: impl Into<String>) -> Self {
        self.expected_exits.insert(code, label.into());
        self
    }

    /// Kill children that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn debug_mode(&self) -> bool {
        self.debug
    }

    pub fn expected_exits(&self) -> &BTreeMap<i32, String> {
        &self.expected_exits
    }

    /// Switch to shell mode: every [`ProcessRunner::exec_take`] runs as one `shell flag script` call.
    ///
    /// The program is spliced into the script verbatim; each argument is
    /// single-quoted, so `commit("two words")` stays one argument.
    pub fn set_shell(&mut self, shell: &str, flag: &str) {
        self.shell_type = Some(shell.to_string());
        self.shell_flag = Some(flag.to_string());
    }

    /// Leave shell mode.
    pub fn clear_shell(&mut self) {
        self.shell_type = None;
        self.shell_flag = None;
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Shell and flag of shell mode; the flag defaults to `-c`.
    fn wrapping_shell(&self) -> Option<(&str, &str)> {
        let shell = self.shell_type.as_deref()?;
        Some((shell, self.shell_flag.as_deref().unwrap_or("-c")))
    }

    fn command(&self, program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.path).envs(&self.env);
        cmd
    }

    #[instrument(skip_all, fields(command = %label, path = %self.path.display()))]
    fn run(&self, cmd: Command, label: &str) -> Result<Captured> {
        if self.debug {
            debug!("exec");
        }
        let raw = run_command(cmd, label, self.timeout, self.output_limit_bytes)?;

        let mut output = raw.stdout.clone();
        output.extend_from_slice(&raw.stderr);

        if raw.timed_out {
            return Err(GitError::TimedOut {
                command: label.to_string(),
                timeout_secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                output,
            });
        }

        let code = raw.status.code();
        match code {
            Some(0) => {}
            Some(code) if self.expected_exits.contains_key(&code) => {
                if self.debug {
                    debug!(
                        exit_code = code,
                        label = %self.expected_exits[&code],
                        "expected exit"
                    );
                }
            }
            _ => {
                if self.debug {
                    warn!(exit_code = ?code, "unexpected exit");
                }
                return Err(GitError::NonZeroExit {
                    command: label.to_string(),
                    code,
                    output,
                });
            }
        }

        Ok(Captured {
            stdout: raw.stdout,
            stderr: raw.stderr,
            exit_code: code.unwrap_or_default(),
        })
    }
}

impl ProcessRunner for CommandRunner {
    fn exec_take(&self, program: &str, args: &[&str]) -> Result<Captured> {
        let label = command_label(program, args);
        match self.wrapping_shell() {
            Some((shell, flag)) => {
                let script = shell_script(program, args);
                self.run(self.command(shell, &[flag, &script]), &label)
            }
            None => self.run(self.command(program, args), &label),
        }
    }

    fn exec_shell(&self, script: &str) -> Result<Captured> {
        let (shell, flag) = self
            .wrapping_shell()
            .unwrap_or((self.script_shell.0.as_str(), self.script_shell.1.as_str()));
        self.run(self.command(shell, &[flag, script]), script)
    }

    fn new_config(&self) -> Self {
        Self {
            expected_exits: BTreeMap::new(),
            ..self.clone()
        }
    }

    fn set_path(&mut self, path: &Path) {
        self.path = path.to_path_buf();
    }

    fn set_debug_mode(&mut self, debug: bool) {
        self.debug = debug;
    }

    fn expect_exit(&mut self, code: i32, label: &str) {
        self.expected_exits.insert(code, label.to_string());
    }
}

/// `program arg…` as one line, for logs and error messages.
pub fn command_label(program: &str, args: &[&str]) -> String {
    let mut label = program.to_string();
    for arg in args {
        label.push(' ');
        label.push_str(arg);
    }
    label
}

/// `program` followed by each argument quoted for a POSIX shell.
pub fn shell_script(program: &str, args: &[&str]) -> String {
    let mut script = program.to_string();
    for arg in args {
        script.push(' ');
        script.push_str(&shell_quote(arg));
    }
    script
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-./:=@%+,^".contains(&b));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[derive(Debug)]
struct RawOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    timed_out: bool,
}

/// Run a command and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount
/// of each stream stored in memory (bytes beyond this are discarded while still draining).
/// A failure to start the child is [`GitError::Spawn`]; anything after that is [`GitError::Io`].
fn run_command(
    mut cmd: Command,
    label: &str,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<RawOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        error!(err = %e, "failed to spawn command");
        GitError::spawn(label, e)
    })?;
    let io_err = |e: std::io::Error| GitError::io(label, e);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_err(std::io::Error::other("stdout was not piped")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_err(std::io::Error::other("stderr was not piped")))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match timeout {
        Some(timeout) => match child.wait_timeout(timeout).map_err(io_err)? {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "command timed out, killing"
                );
                timed_out = true;
                child.kill().map_err(io_err)?;
                child.wait().map_err(io_err)?
            }
        },
        None => child.wait().map_err(io_err)?,
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).map_err(io_err)?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).map_err(io_err)?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(RawOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn join_output(
    handle: thread::JoinHandle<std::io::Result<(Vec<u8>, usize)>>,
) -> std::io::Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::other("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
