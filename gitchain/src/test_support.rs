//! Test-only helpers: isolated git repositories, a scripted runner and a
//! recording debug sink.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::Level;

use crate::chain::{Chain, DebugRecord, DebugSink};
use crate::error::GitError;
use crate::io::process::{Captured, CommandRunner, ProcessRunner, command_label};

/// Environment that makes git ignore the user's config and commit as a fixed identity.
///
/// `init.defaultBranch` is pinned to `main` so branch names are deterministic.
pub fn isolated_git_env() -> Vec<(String, String)> {
    let settings = [
        ("init.defaultBranch", "main"),
        ("user.name", "gitchain tests"),
        ("user.email", "tests@gitchain.invalid"),
        ("commit.gpgsign", "false"),
        ("tag.gpgsign", "false"),
    ];
    let mut env = vec![
        ("GIT_CONFIG_NOSYSTEM".to_string(), "1".to_string()),
        ("GIT_CONFIG_GLOBAL".to_string(), "/dev/null".to_string()),
        ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
        ("GIT_CONFIG_COUNT".to_string(), settings.len().to_string()),
    ];
    for (i, (key, value)) in settings.iter().enumerate() {
        env.push((format!("GIT_CONFIG_KEY_{i}"), (*key).to_string()));
        env.push((format!("GIT_CONFIG_VALUE_{i}"), (*value).to_string()));
    }
    env
}

/// [`CommandRunner`] with [`isolated_git_env`] applied.
pub fn isolated_runner() -> CommandRunner {
    isolated_git_env()
        .into_iter()
        .fold(CommandRunner::new(), |runner, (key, value)| {
            runner.with_env(key, value)
        })
}

/// Temporary directory for one repository, removed on drop.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("gitchain-")
            .tempdir()
            .context("create temp repo dir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Chain at the repository root using [`isolated_runner`].
    pub fn chain(&self) -> Chain {
        Chain::with_runner(self.path(), &isolated_runner())
    }

    /// Chain at `rel` below the root.
    pub fn chain_at(&self, rel: &str) -> Chain {
        Chain::with_runner(self.path().join(rel), &isolated_runner())
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// `git init` plus one commit containing `README.md`.
    pub fn with_initial_commit() -> Result<Self> {
        let repo = Self::new()?;
        repo.chain().init().into_result()?;
        repo.write("README.md", "# test\n")?;
        repo.chain().add().commit("initial").into_result()?;
        Ok(repo)
    }
}

/// One canned response of a [`ScriptedRunner`].
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    pub exit_code: i32,
    pub output: String,
}

impl ScriptedStep {
    pub fn ok(output: &str) -> Self {
        Self {
            exit_code: 0,
            output: output.to_string(),
        }
    }

    pub fn fail(exit_code: i32, output: &str) -> Self {
        Self {
            exit_code,
            output: output.to_string(),
        }
    }
}

/// In-memory [`ProcessRunner`] that replays [`ScriptedStep`]s in order.
///
/// Clones share the step queue and the call log, so a test can keep one
/// handle while a chain drives another. The allowlist is per clone.
#[derive(Debug, Clone)]
pub struct ScriptedRunner {
    path: PathBuf,
    debug: bool,
    expected: BTreeSet<i32>,
    steps: Rc<RefCell<VecDeque<ScriptedStep>>>,
    calls: Rc<RefCell<Vec<String>>>,
    exhausted_ok: bool,
}

impl ScriptedRunner {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            path: PathBuf::from("."),
            debug: false,
            expected: BTreeSet::new(),
            steps: Rc::new(RefCell::new(steps.into())),
            calls: Rc::new(RefCell::new(Vec::new())),
            exhausted_ok: false,
        }
    }

    /// Runner that answers every call with empty success.
    pub fn always_ok() -> Self {
        Self {
            exhausted_ok: true,
            ..Self::new(Vec::new())
        }
    }

    /// Command lines received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn expected(&self) -> Vec<i32> {
        self.expected.iter().copied().collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn debug_mode(&self) -> bool {
        self.debug
    }

    fn answer(&self, label: String) -> Result<Captured, GitError> {
        self.calls.borrow_mut().push(label.clone());
        let step = match self.steps.borrow_mut().pop_front() {
            Some(step) => step,
            None if self.exhausted_ok => ScriptedStep::ok(""),
            None => return Err(GitError::unexpected(label, "no scripted step left")),
        };
        let output = step.output.into_bytes();
        if step.exit_code == 0 || self.expected.contains(&step.exit_code) {
            return Ok(Captured {
                stdout: output,
                stderr: Vec::new(),
                exit_code: step.exit_code,
            });
        }
        Err(GitError::NonZeroExit {
            command: label,
            code: Some(step.exit_code),
            output,
        })
    }
}

impl ProcessRunner for ScriptedRunner {
    fn exec_take(&self, program: &str, args: &[&str]) -> Result<Captured, GitError> {
        self.answer(command_label(program, args))
    }

    fn exec_shell(&self, script: &str) -> Result<Captured, GitError> {
        self.answer(command_label("sh", &["-c", script]))
    }

    fn new_config(&self) -> Self {
        Self {
            expected: BTreeSet::new(),
            ..self.clone()
        }
    }

    fn set_path(&mut self, path: &Path) {
        self.path = path.to_path_buf();
    }

    fn set_debug_mode(&mut self, debug: bool) {
        self.debug = debug;
    }

    fn expect_exit(&mut self, code: i32, _label: &str) {
        self.expected.insert(code);
    }
}

/// Owned copy of a [`DebugRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDebug {
    pub level: Level,
    pub message: &'static str,
    pub output: String,
    pub error: Option<String>,
    pub file: String,
    pub line: u32,
}

/// [`DebugSink`] that keeps every record; clones share the store.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Rc<RefCell<Vec<RecordedDebug>>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<RecordedDebug> {
        self.records.borrow().clone()
    }
}

impl DebugSink for RecordingSink {
    fn emit(&self, record: &DebugRecord<'_>) {
        self.records.borrow_mut().push(RecordedDebug {
            level: record.level,
            message: record.message(),
            output: record.output_text(),
            error: record.error.map(ToString::to_string),
            file: record.caller.file().to_string(),
            line: record.caller.line(),
        });
    }
}
