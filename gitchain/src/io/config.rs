//! Runner configuration stored in `.gitchain.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::process::{CommandRunner, DEFAULT_OUTPUT_LIMIT_BYTES};

/// File name looked up in the working path when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = ".gitchain.toml";

/// Runner configuration (TOML).
///
/// Missing fields default to the values a plain `Chain::new` would use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Kill a child after this many seconds; 0 disables the deadline.
    pub timeout_secs: u64,

    /// Truncate each captured stream beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Emit debug records for every step.
    pub debug: bool,

    /// Extra environment for every child.
    pub env: BTreeMap<String, String>,

    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell used by pattern-taking helpers (e.g. `sh`, `bash`).
    pub program: String,
    /// Flag that makes the shell read a script argument.
    pub flag: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "sh".to_string(),
            flag: "-c".to_string(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            debug: false,
            env: BTreeMap::new(),
            shell: ShellConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.shell.program.trim().is_empty() {
            return Err(anyhow!("shell.program must be non-empty"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Build a runner rooted at `path`.
    pub fn to_runner(&self, path: &Path) -> CommandRunner {
        let mut runner = CommandRunner::new()
            .with_path(path)
            .with_debug_mode(self.debug)
            .with_output_limit(self.output_limit_bytes)
            .with_script_shell(&self.shell.program, &self.shell.flag);
        if let Some(timeout) = self.timeout() {
            runner = runner.with_timeout(timeout);
        }
        for (key, value) in &self.env {
            runner = runner.with_env(key, value);
        }
        runner
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

const CONFIG_HEADER: &str = "# gitchain runner config. Keys left out take their defaults.\n\n";

/// TOML text for `cfg`, as written by `gitchain init-config`.
pub fn render_config(cfg: &RunnerConfig) -> Result<String> {
    cfg.validate()?;
    let body = toml::to_string_pretty(cfg).context("serialize config toml")?;
    Ok(format!("{CONFIG_HEADER}{body}"))
}

/// Write `cfg` to `path`, replacing an existing file only when `overwrite` is set.
///
/// The text goes to a hidden sibling first and is renamed into place.
pub fn write_config(path: &Path, cfg: &RunnerConfig, overwrite: bool) -> Result<()> {
    if !overwrite && path.exists() {
        bail!("{} already exists", path.display());
    }
    let contents = render_config(cfg)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .with_context(|| format!("config path has no file name: {}", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    let staging = dir.join(format!(".{}.tmp", name.to_string_lossy()));
    fs::write(&staging, contents).with_context(|| format!("write {}", staging.display()))?;
    fs::rename(&staging, path).with_context(|| format!("replace config {}", path.display()))?;
    debug!(path = %path.display(), "wrote runner config");
    Ok(())
}
